//! Error types for the check-in layer.

use chrono::{DateTime, Utc};
use rollcall_protocol::{SessionId, UserId};
use rollcall_store::StoreError;

/// Why a check-in (or an attendance read) did not succeed.
///
/// The first three variants are answers, not failures: the caller did
/// something the rules forbid and nothing was written. Only
/// [`Store`](Self::Store) is a fault.
#[derive(Debug, thiserror::Error)]
pub enum CheckInError {
    /// The token does not belong to any session. Malformed and unknown
    /// tokens are indistinguishable.
    #[error("invalid check-in token")]
    InvalidToken,

    /// The session exists but stopped accepting check-ins.
    #[error("session {session_id} expired at {expired_at}")]
    SessionExpired {
        session_id: SessionId,
        expired_at: DateTime<Utc>,
    },

    /// The student already has a record for this session. The existing
    /// record is untouched.
    #[error("student {student_id} already checked in to session {session_id}")]
    DuplicateCheckIn {
        session_id: SessionId,
        student_id: UserId,
    },

    #[error("attendance storage failed: {0}")]
    Store(#[from] StoreError),
}

impl CheckInError {
    /// Returns `true` if the error is a fault rather than a rejection.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Returns `true` if repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }
}
