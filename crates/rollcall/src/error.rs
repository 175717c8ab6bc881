//! Unified error type for Rollcall.

use rollcall_checkin::CheckInError;
use rollcall_protocol::{ProtocolError, RejectionKind, Role};
use rollcall_session::{IdentityError, SessionError};
use rollcall_store::StoreError;
use rollcall_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RollcallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Session creation or token resolution failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A check-in was rejected, or an attendance read failed.
    #[error(transparent)]
    CheckIn(#[from] CheckInError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// The caller's role does not permit the operation.
    #[error("this operation requires the {required} role")]
    Forbidden { required: Role },
}

impl RollcallError {
    /// The rejection a client should see for this error, if it is a
    /// per-request outcome.
    ///
    /// Returns `None` for connection-level problems (transport, protocol,
    /// configuration, a rejected credential), which are not answered with
    /// a `Rejected` message.
    pub fn rejection(&self) -> Option<RejectionKind> {
        match self {
            Self::Forbidden { .. } => Some(RejectionKind::Forbidden),
            Self::Session(SessionError::Validation(_)) => Some(RejectionKind::Validation),
            Self::Session(SessionError::NotFound) => Some(RejectionKind::InvalidToken),
            Self::CheckIn(CheckInError::InvalidToken) => Some(RejectionKind::InvalidToken),
            Self::CheckIn(CheckInError::SessionExpired { .. }) => {
                Some(RejectionKind::SessionExpired)
            }
            Self::CheckIn(CheckInError::DuplicateCheckIn { .. }) => {
                Some(RejectionKind::DuplicateCheckIn)
            }
            Self::Session(SessionError::Store(_))
            | Self::CheckIn(CheckInError::Store(_))
            | Self::Store(_)
            | Self::Identity(IdentityError::Unavailable(_)) => Some(RejectionKind::Unavailable),
            Self::Identity(IdentityError::Unauthenticated)
            | Self::Transport(_)
            | Self::Protocol(_)
            | Self::Config(_) => None,
        }
    }

    /// Returns `true` for faults (as opposed to rejections of the
    /// caller's request).
    pub fn is_fault(&self) -> bool {
        match self.rejection() {
            Some(kind) => kind == RejectionKind::Unavailable,
            None => !matches!(self, Self::Identity(IdentityError::Unauthenticated)),
        }
    }
}
