//! Error types for the store layer.

use std::fmt;
use std::time::Duration;

/// Which uniqueness rule a write collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniqueKey {
    /// `sessions.id`
    SessionId,
    /// `sessions.token`
    SessionToken,
    /// `attendance.id`
    RecordId,
    /// `attendance (session_id, student_id)`
    SessionStudent,
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionId => write!(f, "sessions.id"),
            Self::SessionToken => write!(f, "sessions.token"),
            Self::RecordId => write!(f, "attendance.id"),
            Self::SessionStudent => write!(f, "attendance(session_id, student_id)"),
        }
    }
}

/// Errors a storage backend can report.
///
/// Only [`Unavailable`](Self::Unavailable) and [`Timeout`](Self::Timeout)
/// are faults. A unique violation is an expected answer from the
/// database, and callers turn it into a domain outcome.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A write was rejected by a uniqueness rule. Nothing was written.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(UniqueKey),

    /// A write broke some other integrity rule (missing parent row,
    /// failed check). Nothing was written.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// The backend could not be reached or failed mid-call.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the caller's deadline.
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    /// A row read back from storage does not form a valid entity.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns `true` for faults a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}
