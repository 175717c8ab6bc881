//! In-memory backend.
//!
//! Every table lives behind ONE `tokio::sync::Mutex`. A write takes the
//! lock, checks the uniqueness indexes, and inserts before releasing it,
//! so the check and the insert are a single atomic step. Concurrent
//! check-ins for the same pair serialize on the lock and exactly one wins.

use std::collections::HashMap;

use rollcall_protocol::{
    AttendanceEntry, AttendanceRecord, RecordId, Session, SessionId, UserId,
};
use tokio::sync::Mutex;

use crate::{AttendanceRepository, SessionRepository, StoreError, UniqueKey};

#[derive(Default)]
struct Tables {
    sessions: HashMap<SessionId, Session>,

    /// Index: token → session. Mirrors `sessions.token UNIQUE`.
    tokens: HashMap<String, SessionId>,

    attendance: HashMap<RecordId, AttendanceRecord>,

    /// Index: (session, student) → record. Mirrors
    /// `UNIQUE(session_id, student_id)`.
    checked_in: HashMap<(SessionId, UserId), RecordId>,
}

/// A [`SessionRepository`] + [`AttendanceRepository`] held in process
/// memory. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of attendance records across all sessions.
    pub async fn attendance_len(&self) -> usize {
        self.tables.lock().await.attendance.len()
    }
}

impl SessionRepository for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;

        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::UniqueViolation(UniqueKey::SessionId));
        }
        if tables.tokens.contains_key(&session.token) {
            return Err(StoreError::UniqueViolation(UniqueKey::SessionToken));
        }

        tables.tokens.insert(session.token.clone(), session.id);
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tokens
            .get(token)
            .and_then(|id| tables.sessions.get(id))
            .cloned())
    }

    async fn sessions_by_owner(&self, owner_id: &UserId) -> Result<Vec<Session>, StoreError> {
        let tables = self.tables.lock().await;
        let mut sessions: Vec<Session> = tables
            .sessions
            .values()
            .filter(|s| &s.owner_id == owner_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

impl AttendanceRepository for MemoryStore {
    async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;

        if !tables.sessions.contains_key(&record.session_id) {
            return Err(StoreError::Constraint(format!(
                "attendance.session_id references unknown session {}",
                record.session_id
            )));
        }

        let key = (record.session_id, record.student_id.clone());
        if tables.checked_in.contains_key(&key) {
            return Err(StoreError::UniqueViolation(UniqueKey::SessionStudent));
        }
        if tables.attendance.contains_key(&record.id) {
            return Err(StoreError::UniqueViolation(UniqueKey::RecordId));
        }

        tables.checked_in.insert(key, record.id);
        tables.attendance.insert(record.id, record.clone());
        Ok(())
    }

    async fn attendance_by_student(
        &self,
        student_id: &UserId,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let tables = self.tables.lock().await;
        let mut entries: Vec<AttendanceEntry> = tables
            .attendance
            .values()
            .filter(|r| &r.student_id == student_id)
            .filter_map(|r| {
                let session = tables.sessions.get(&r.session_id)?;
                Some(AttendanceEntry {
                    record: r.clone(),
                    subject: session.subject.clone(),
                    session_created_at: session.created_at,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp));
        Ok(entries)
    }

    async fn count_attendance(&self, session_id: SessionId) -> Result<u64, StoreError> {
        let tables = self.tables.lock().await;
        let count = tables
            .checked_in
            .keys()
            .filter(|(sid, _)| *sid == session_id)
            .count();
        Ok(count as u64)
    }

    async fn attendance_counts_by_owner(
        &self,
        owner_id: &UserId,
    ) -> Result<HashMap<SessionId, u64>, StoreError> {
        let tables = self.tables.lock().await;
        let mut counts = HashMap::new();
        for record in tables.attendance.values() {
            let owned = tables
                .sessions
                .get(&record.session_id)
                .is_some_and(|s| &s.owner_id == owner_id);
            if owned {
                *counts.entry(record.session_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
