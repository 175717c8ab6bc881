//! The check-in engine.
//!
//! Check-in is three steps, in this order:
//!
//! ```text
//! resolve token ──(unknown)──────────→ InvalidToken
//!      │
//! phase at now ──(Closed)────────────→ SessionExpired
//!      │         (Pending)───────────→ InvalidToken
//!      │
//! insert (session, student) ──(taken)→ DuplicateCheckIn
//!      │
//!      ▼
//!   present record
//! ```
//!
//! The engine never checks for an existing record before inserting. The
//! insert itself is the check: the store rejects a second record for the
//! same pair atomically, so two racing check-ins cannot both succeed.
//!
//! # Why not look first?
//!
//! A "find, then insert if missing" sequence has a window between the two
//! calls. Two requests from the same student (a double tap, a retried
//! frame) can both pass the find and both insert. Closing that window with
//! a lock in this crate would only work inside one process; the SQLite
//! backend may be shared. The unique key on `(session_id, student_id)` is
//! the one place every writer goes through, so that is where the decision
//! is made, and the engine only translates the outcome.
//!
//! # Time
//!
//! The phase check uses `now` exactly as given. Only the stored record
//! timestamp is truncated to whole milliseconds, the resolution every
//! backend keeps. Truncating before the check would round an instant just
//! past `expires_at` back inside the window.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use rollcall_checkin::{CheckInConfig, CheckInEngine};
//! # use rollcall_protocol::UserId;
//! # use rollcall_session::{SessionPolicy, SessionStore};
//! # use rollcall_store::MemoryStore;
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = Arc::new(MemoryStore::new());
//! let sessions = SessionStore::new(repo, SessionPolicy::default());
//! let engine = CheckInEngine::new(sessions.clone(), CheckInConfig::default());
//!
//! let session = sessions
//!     .create("Algebra I", &UserId::new("teacher-1"), Duration::from_secs(30 * 60))
//!     .await?;
//! let record = engine.check_in(&session.token, &UserId::new("alice")).await?;
//! assert_eq!(record.session_id, session.id);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use rollcall_protocol::{
    AttendanceEntry, AttendanceRecord, SessionId, SessionSummary, StudentOverview,
    TeacherOverview, UserId,
};
use rollcall_session::{SessionError, SessionStore};
use rollcall_store::{
    AttendanceRepository, SessionRepository, StoreError, UniqueKey, with_deadline,
};

use crate::{CheckInConfig, CheckInError, SessionPhase};

/// Records check-ins and answers attendance queries.
///
/// Holds no mutable state. Clones share the same store.
pub struct CheckInEngine<R> {
    sessions: SessionStore<R>,
    repo: Arc<R>,
    config: CheckInConfig,
}

impl<R> Clone for CheckInEngine<R> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            repo: Arc::clone(&self.repo),
            config: self.config.clone(),
        }
    }
}

impl<R> CheckInEngine<R>
where
    R: SessionRepository + AttendanceRepository,
{
    /// Creates an engine that resolves tokens through `sessions` and
    /// writes attendance to the same repository.
    pub fn new(sessions: SessionStore<R>, config: CheckInConfig) -> Self {
        let repo = Arc::clone(sessions.repository());
        Self {
            sessions,
            repo,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionStore<R> {
        &self.sessions
    }

    /// Checks `student_id` in to the session holding `token`, now.
    pub async fn check_in(
        &self,
        token: &str,
        student_id: &UserId,
    ) -> Result<AttendanceRecord, CheckInError> {
        self.check_in_at(token, student_id, Utc::now()).await
    }

    /// Checks `student_id` in to the session holding `token` at `now`.
    ///
    /// The phase is decided against `now` as given. The record's timestamp
    /// is `now` truncated to whole milliseconds.
    ///
    /// # Errors
    /// - [`CheckInError::InvalidToken`]: no session has this token
    /// - [`CheckInError::SessionExpired`]: `now >= expires_at`
    /// - [`CheckInError::DuplicateCheckIn`]: the student already has a
    ///   record for this session
    /// - [`CheckInError::Store`]: storage failed or timed out; no record
    ///   was written
    pub async fn check_in_at(
        &self,
        token: &str,
        student_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, CheckInError> {
        let session = match self.sessions.resolve_by_token(token).await {
            Ok(session) => session,
            Err(SessionError::NotFound | SessionError::Validation(_)) => {
                tracing::debug!(%student_id, "check-in rejected: unknown token");
                return Err(CheckInError::InvalidToken);
            }
            Err(SessionError::Store(e)) => {
                tracing::warn!(%student_id, error = %e, "token lookup failed");
                return Err(e.into());
            }
        };

        match SessionPhase::at(&session, now) {
            SessionPhase::Open => {}
            SessionPhase::Pending => {
                tracing::debug!(
                    session_id = %session.id,
                    %student_id,
                    "check-in rejected: session not started"
                );
                return Err(CheckInError::InvalidToken);
            }
            SessionPhase::Closed => {
                tracing::debug!(
                    session_id = %session.id,
                    %student_id,
                    expired_at = %session.expires_at,
                    "check-in rejected: session expired"
                );
                return Err(CheckInError::SessionExpired {
                    session_id: session.id,
                    expired_at: session.expires_at,
                });
            }
        }

        let record =
            AttendanceRecord::present(session.id, student_id.clone(), now.trunc_subsecs(3));
        let result = with_deadline(
            self.config.storage_timeout,
            self.repo.insert_attendance(&record),
        )
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    session_id = %session.id,
                    %student_id,
                    record_id = %record.id,
                    "check-in recorded"
                );
                Ok(record)
            }
            Err(StoreError::UniqueViolation(UniqueKey::SessionStudent)) => {
                tracing::debug!(
                    session_id = %session.id,
                    %student_id,
                    "check-in rejected: already checked in"
                );
                Err(CheckInError::DuplicateCheckIn {
                    session_id: session.id,
                    student_id: student_id.clone(),
                })
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session.id,
                    %student_id,
                    error = %e,
                    "attendance insert failed"
                );
                Err(e.into())
            }
        }
    }

    /// A student's attendance history, newest first.
    pub async fn list_for_student(
        &self,
        student_id: &UserId,
    ) -> Result<Vec<AttendanceEntry>, CheckInError> {
        Ok(with_deadline(
            self.config.storage_timeout,
            self.repo.attendance_by_student(student_id),
        )
        .await?)
    }

    /// Number of records for one session.
    pub async fn attendance_count(&self, session_id: SessionId) -> Result<u64, CheckInError> {
        Ok(with_deadline(
            self.config.storage_timeout,
            self.repo.count_attendance(session_id),
        )
        .await?)
    }

    /// The owner's sessions, newest first, each with its record count and
    /// whether it is open at `now`.
    pub async fn session_summaries(
        &self,
        owner_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionSummary>, CheckInError> {
        let sessions = with_deadline(
            self.config.storage_timeout,
            self.repo.sessions_by_owner(owner_id),
        )
        .await?;
        let counts: HashMap<SessionId, u64> = with_deadline(
            self.config.storage_timeout,
            self.repo.attendance_counts_by_owner(owner_id),
        )
        .await?;

        Ok(sessions
            .into_iter()
            .map(|session| SessionSummary {
                attendance_count: counts.get(&session.id).copied().unwrap_or(0),
                open: SessionPhase::at(&session, now).accepts_check_ins(),
                session,
            })
            .collect())
    }

    pub async fn teacher_overview(
        &self,
        owner_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<TeacherOverview, CheckInError> {
        let summaries = self.session_summaries(owner_id, now).await?;
        Ok(TeacherOverview::from_summaries(&summaries))
    }

    pub async fn student_overview(
        &self,
        student_id: &UserId,
    ) -> Result<StudentOverview, CheckInError> {
        let entries = self.list_for_student(student_id).await?;
        Ok(StudentOverview::from_entries(&entries))
    }
}
