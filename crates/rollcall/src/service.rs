//! The attendance service: role checks in front of the core.
//!
//! Every call takes the caller's [`Identity`] explicitly. There is no
//! ambient "current user"; whoever resolved the identity (the connection
//! handler, an HTTP layer, a test) passes it in.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rollcall_checkin::{CheckInConfig, CheckInEngine};
use rollcall_protocol::{
    AttendanceEntry, AttendanceRecord, Identity, Role, Session, SessionSummary,
    StudentOverview, TeacherOverview,
};
use rollcall_session::{SessionPolicy, SessionStore};
use rollcall_store::{AttendanceRepository, SessionRepository};

use crate::RollcallError;

/// Teacher and student operations over one repository.
pub struct AttendanceService<R> {
    engine: CheckInEngine<R>,
}

impl<R> Clone for AttendanceService<R> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<R> AttendanceService<R>
where
    R: SessionRepository + AttendanceRepository,
{
    pub fn new(repo: Arc<R>, policy: SessionPolicy, config: CheckInConfig) -> Self {
        let sessions = SessionStore::new(repo, policy);
        Self {
            engine: CheckInEngine::new(sessions, config),
        }
    }

    pub fn from_engine(engine: CheckInEngine<R>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &CheckInEngine<R> {
        &self.engine
    }

    // -- Teacher ---------------------------------------------------------

    /// Opens a session owned by the calling teacher.
    pub async fn create_session(
        &self,
        identity: &Identity,
        subject: &str,
        duration: Duration,
    ) -> Result<Session, RollcallError> {
        self.create_session_at(identity, subject, duration, Utc::now())
            .await
    }

    pub async fn create_session_at(
        &self,
        identity: &Identity,
        subject: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Session, RollcallError> {
        require(identity, Role::Teacher)?;
        Ok(self
            .engine
            .sessions()
            .create_at(subject, &identity.user_id, duration, now)
            .await?)
    }

    /// The calling teacher's sessions, newest first, with counts.
    pub async fn list_sessions(
        &self,
        identity: &Identity,
    ) -> Result<Vec<SessionSummary>, RollcallError> {
        self.list_sessions_at(identity, Utc::now()).await
    }

    pub async fn list_sessions_at(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionSummary>, RollcallError> {
        require(identity, Role::Teacher)?;
        Ok(self.engine.session_summaries(&identity.user_id, now).await?)
    }

    pub async fn teacher_overview(
        &self,
        identity: &Identity,
    ) -> Result<TeacherOverview, RollcallError> {
        require(identity, Role::Teacher)?;
        Ok(self
            .engine
            .teacher_overview(&identity.user_id, Utc::now())
            .await?)
    }

    // -- Student ---------------------------------------------------------

    /// Checks the calling student in with a scanned token.
    pub async fn check_in(
        &self,
        identity: &Identity,
        token: &str,
    ) -> Result<AttendanceRecord, RollcallError> {
        self.check_in_at(identity, token, Utc::now()).await
    }

    pub async fn check_in_at(
        &self,
        identity: &Identity,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, RollcallError> {
        require(identity, Role::Student)?;
        Ok(self
            .engine
            .check_in_at(token, &identity.user_id, now)
            .await?)
    }

    /// The calling student's attendance history, newest first.
    pub async fn list_attendance(
        &self,
        identity: &Identity,
    ) -> Result<Vec<AttendanceEntry>, RollcallError> {
        require(identity, Role::Student)?;
        Ok(self.engine.list_for_student(&identity.user_id).await?)
    }

    pub async fn student_overview(
        &self,
        identity: &Identity,
    ) -> Result<StudentOverview, RollcallError> {
        require(identity, Role::Student)?;
        Ok(self.engine.student_overview(&identity.user_id).await?)
    }
}

fn require(identity: &Identity, required: Role) -> Result<(), RollcallError> {
    if identity.role == required {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %identity.user_id,
            role = %identity.role,
            %required,
            "request forbidden"
        );
        Err(RollcallError::Forbidden { required })
    }
}
