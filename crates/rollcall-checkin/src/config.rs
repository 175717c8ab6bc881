//! Check-in configuration and the session phase state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rollcall_protocol::Session;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CheckInConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`CheckInEngine`](crate::CheckInEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInConfig {
    /// Deadline for each attendance storage call. `None` waits
    /// indefinitely. Default: 5 seconds.
    pub storage_timeout: Option<Duration>,
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Some(Duration::from_secs(5)),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Where a session is in its life, as seen from a given instant.
///
/// Phases are strictly ordered and never go back:
///
/// ```text
/// Pending → Open → Closed
/// ```
///
/// - **Pending**: `now < created_at`. Only reachable with a skewed clock.
/// - **Open**: `created_at <= now < expires_at`. Check-ins accepted.
/// - **Closed**: `now >= expires_at`. Terminal; nothing extends a session.
///
/// The phase is never stored. It is recomputed from the clock on every
/// call, so the `active` column on a session has no say in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Pending,
    Open,
    Closed,
}

impl SessionPhase {
    /// The phase of `session` at `now`.
    pub fn at(session: &Session, now: DateTime<Utc>) -> Self {
        if now < session.created_at {
            Self::Pending
        } else if now < session.expires_at {
            Self::Open
        } else {
            Self::Closed
        }
    }

    /// Returns `true` if check-ins are accepted in this phase.
    pub fn accepts_check_ins(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// The phase that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Open),
            Self::Open => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns `true` if moving to `target` is a valid transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rollcall_protocol::{SessionId, UserId};

    use super::*;

    fn session() -> Session {
        let t0 = Utc.with_ymd_and_hms(2025, 9, 8, 10, 0, 0).unwrap();
        Session {
            id: SessionId::new(),
            subject: "Algebra I".into(),
            owner_id: UserId::new("t1"),
            token: "tok".into(),
            created_at: t0,
            expires_at: t0 + chrono::Duration::minutes(30),
            active: true,
        }
    }

    #[test]
    fn test_session_phase_at_boundaries() {
        let s = session();
        let ms = chrono::Duration::milliseconds(1);

        assert_eq!(SessionPhase::at(&s, s.created_at - ms), SessionPhase::Pending);
        assert_eq!(SessionPhase::at(&s, s.created_at), SessionPhase::Open);
        assert_eq!(SessionPhase::at(&s, s.expires_at - ms), SessionPhase::Open);
        assert_eq!(SessionPhase::at(&s, s.expires_at), SessionPhase::Closed);
    }

    #[test]
    fn test_session_phase_ignores_active_flag() {
        let mut s = session();
        s.active = false;
        assert_eq!(SessionPhase::at(&s, s.created_at), SessionPhase::Open);

        let mut s = session();
        s.active = true;
        assert_eq!(SessionPhase::at(&s, s.expires_at), SessionPhase::Closed);
    }

    #[test]
    fn test_session_phase_next_follows_strict_order() {
        assert_eq!(SessionPhase::Pending.next(), Some(SessionPhase::Open));
        assert_eq!(SessionPhase::Open.next(), Some(SessionPhase::Closed));
        assert_eq!(SessionPhase::Closed.next(), None);
    }

    #[test]
    fn test_session_phase_can_transition_to() {
        assert!(SessionPhase::Pending.can_transition_to(SessionPhase::Open));
        assert!(!SessionPhase::Pending.can_transition_to(SessionPhase::Closed));
        assert!(!SessionPhase::Closed.can_transition_to(SessionPhase::Open));
    }

    #[test]
    fn test_session_phase_accepts_check_ins_only_when_open() {
        assert!(!SessionPhase::Pending.accepts_check_ins());
        assert!(SessionPhase::Open.accepts_check_ins());
        assert!(!SessionPhase::Closed.accepts_check_ins());
    }

    #[test]
    fn test_check_in_config_default() {
        let config = CheckInConfig::default();
        assert_eq!(config.storage_timeout, Some(Duration::from_secs(5)));
    }
}
