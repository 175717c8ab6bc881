//! Repository traits and the deadline helper.
//!
//! Same shape as an auth hook: a trait with async methods that returns
//! `impl Future + Send`, so implementations can be plain `async fn`s and
//! callers can drive them from any Tokio task.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use rollcall_protocol::{AttendanceEntry, AttendanceRecord, Session, SessionId, UserId};

use crate::StoreError;

/// Persists sessions and answers token lookups.
///
/// # Contract
///
/// - `insert_session` rejects a duplicate `token` (or `id`) with
///   [`StoreError::UniqueViolation`] and writes nothing.
/// - `find_session_by_token` matches by exact string equality.
/// - `sessions_by_owner` returns newest first (`created_at` descending).
pub trait SessionRepository: Send + Sync + 'static {
    fn insert_session(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn find_session_by_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;

    fn sessions_by_owner(
        &self,
        owner_id: &UserId,
    ) -> impl Future<Output = Result<Vec<Session>, StoreError>> + Send;
}

/// Persists attendance records.
///
/// # Contract
///
/// `insert_attendance` is a single compare-and-insert: if a record for
/// the same `(session_id, student_id)` already exists, it fails with
/// `StoreError::UniqueViolation(UniqueKey::SessionStudent)` and writes
/// nothing. Two concurrent inserts for the same pair never both succeed.
pub trait AttendanceRepository: Send + Sync + 'static {
    fn insert_attendance(
        &self,
        record: &AttendanceRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// A student's history joined with session details, newest first.
    fn attendance_by_student(
        &self,
        student_id: &UserId,
    ) -> impl Future<Output = Result<Vec<AttendanceEntry>, StoreError>> + Send;

    fn count_attendance(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Record counts for every session the owner has opened.
    /// Sessions with no records may be absent from the map.
    fn attendance_counts_by_owner(
        &self,
        owner_id: &UserId,
    ) -> impl Future<Output = Result<HashMap<SessionId, u64>, StoreError>> + Send;
}

/// Runs a storage call under an optional deadline.
///
/// When the deadline elapses the inner future is dropped, which cancels
/// the call, and the caller gets [`StoreError::Timeout`]. The backends
/// only write inside a single statement or a single lock acquisition, so
/// a cancelled call leaves either the full row or nothing.
pub async fn with_deadline<T, F>(limit: Option<Duration>, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| StoreError::Timeout(limit))?,
        None => call.await,
    }
}
