//! Error types for the session layer.

use rollcall_store::StoreError;

/// A create-session request that failed input validation. Nothing was
/// written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The subject was empty after trimming whitespace.
    #[error("subject must not be empty")]
    EmptySubject,

    #[error("subject is {actual} characters, the limit is {max}")]
    SubjectTooLong { max: usize, actual: usize },

    /// Duration outside the allowed window. Values are whole minutes,
    /// `actual` rounded down.
    #[error("duration of {actual} minutes is outside the allowed {min}..={max} minutes")]
    DurationOutOfRange { min: u64, max: u64, actual: u64 },

    /// The owner id is too long to fit in an issued token. Values are
    /// bytes of the owner id.
    #[error("owner id is {actual} bytes, the limit is {max}")]
    OwnerIdTooLong { max: usize, actual: usize },
}

/// Errors from creating or resolving sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No session has exactly this token.
    #[error("no session matches the presented token")]
    NotFound,

    /// The store failed or timed out.
    #[error("session storage failed: {0}")]
    Store(#[from] StoreError),
}

/// Why a credential could not be turned into an identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The credential is unknown, malformed, or revoked.
    #[error("credential rejected")]
    Unauthenticated,

    /// The identity backend could not be consulted.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}
