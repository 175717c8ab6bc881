//! Wire messages exchanged between Rollcall clients and the server.
//!
//! Every frame on the wire is an [`Envelope`] carrying either a
//! [`ClientMessage`] (client → server) or a [`ServerMessage`]
//! (server → client). Messages are internally tagged
//! (`{ "type": "CheckIn", "token": "…" }`) so browser clients can switch
//! on a single field.

use serde::{Deserialize, Serialize};

use crate::{
    AttendanceEntry, AttendanceRecord, Role, Session, SessionSummary,
    StudentOverview, TeacherOverview, UserId,
};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level message wrapper.
///
/// ```text
/// ┌──────────────────────────────┐
/// │ seq: 7                       │  ← sender's sequence number
/// │ timestamp: 15000             │  ← ms since the sender started
/// │ reply_to: 4                  │  ← request this answers (server only)
/// │ message: CheckedIn { … }     │
/// └──────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<M> {
    pub seq: u64,
    pub timestamp: u64,

    /// The `seq` of the client request this envelope answers.
    /// Absent on client requests and unsolicited server messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<u64>,

    pub message: M,
}

impl<M> Envelope<M> {
    /// Creates an envelope that doesn't answer anything.
    pub fn new(seq: u64, timestamp: u64, message: M) -> Self {
        Self {
            seq,
            timestamp,
            reply_to: None,
            message,
        }
    }

    /// Creates an envelope answering the request with sequence `reply_to`.
    pub fn reply(seq: u64, timestamp: u64, reply_to: u64, message: M) -> Self {
        Self {
            seq,
            timestamp,
            reply_to: Some(reply_to),
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Requests a client can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First message on every connection. `credential` is whatever the
    /// identity provider understands (a bearer token, a session cookie).
    Handshake { version: u32, credential: String },

    /// Keep-alive. Echoed back with the server's clock.
    Heartbeat { client_time: u64 },

    /// Teacher: open a new attendance window.
    CreateSession {
        subject: String,
        duration_minutes: u32,
    },

    /// Student: redeem a scanned token.
    CheckIn { token: String },

    /// Teacher: list own sessions with attendance counts.
    ListSessions,

    /// Student: list own attendance history.
    ListAttendance,

    /// Close the connection politely.
    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Why a request was turned down.
///
/// These are normal, per-call outcomes that the client shows to the user.
/// Only `Unavailable` indicates a fault, and only `Unavailable` is worth
/// retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Bad input (empty subject, duration out of range).
    Validation,
    /// The token doesn't match any session.
    InvalidToken,
    /// The session's window has closed.
    SessionExpired,
    /// The student already checked in to this session.
    DuplicateCheckIn,
    /// The caller's role doesn't permit the request.
    Forbidden,
    /// Storage or identity provider is unreachable; try again.
    Unavailable,
}

impl RejectionKind {
    /// HTTP-style status code for clients that prefer numbers.
    pub fn code(&self) -> u16 {
        match self {
            Self::Validation => 422,
            Self::InvalidToken => 404,
            Self::SessionExpired => 410,
            Self::DuplicateCheckIn => 409,
            Self::Forbidden => 403,
            Self::Unavailable => 503,
        }
    }

    /// Returns `true` if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Handshake accepted; tells the client who they are.
    HandshakeAck {
        user_id: UserId,
        role: Role,
        server_time: u64,
    },

    HeartbeatAck { client_time: u64, server_time: u64 },

    /// A new session, including the token to render as a code.
    SessionCreated { session: Session },

    /// The student's check-in was recorded.
    CheckedIn { record: AttendanceRecord },

    SessionList {
        sessions: Vec<SessionSummary>,
        overview: TeacherOverview,
    },

    AttendanceList {
        entries: Vec<AttendanceEntry>,
        overview: StudentOverview,
    },

    /// The request was understood but turned down.
    Rejected { kind: RejectionKind, message: String },

    /// Protocol-level failure (bad handshake, undecodable frame).
    /// `code` follows HTTP conventions.
    Error { code: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_check_in_json_format() {
        let msg = ClientMessage::CheckIn {
            token: "tok-A".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "CheckIn");
        assert_eq!(json["token"], "tok-A");
    }

    #[test]
    fn test_client_message_create_session_json_format() {
        let msg = ClientMessage::CreateSession {
            subject: "Algebra I".into(),
            duration_minutes: 30,
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "CreateSession");
        assert_eq!(json["duration_minutes"], 30);
    }

    #[test]
    fn test_envelope_omits_reply_to_when_absent() {
        let env = Envelope::new(1, 0, ClientMessage::ListSessions);
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();

        assert!(json.get("reply_to").is_none());
        assert_eq!(json["message"]["type"], "ListSessions");
    }

    #[test]
    fn test_envelope_reply_to_defaults_when_missing() {
        let json = r#"{ "seq": 1, "timestamp": 0, "message": { "type": "ListAttendance" } }"#;
        let env: Envelope<ClientMessage> = serde_json::from_str(json).unwrap();
        assert_eq!(env.reply_to, None);
        assert_eq!(env.message, ClientMessage::ListAttendance);
    }

    #[test]
    fn test_server_message_rejected_json_format() {
        let msg = ServerMessage::Rejected {
            kind: RejectionKind::DuplicateCheckIn,
            message: "already checked in".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Rejected");
        assert_eq!(json["kind"], "duplicate_check_in");
    }

    #[test]
    fn test_rejection_kind_only_unavailable_is_retryable() {
        assert!(RejectionKind::Unavailable.is_retryable());
        assert!(!RejectionKind::DuplicateCheckIn.is_retryable());
        assert!(!RejectionKind::SessionExpired.is_retryable());
    }

    #[test]
    fn test_rejection_kind_codes_are_distinct() {
        let kinds = [
            RejectionKind::Validation,
            RejectionKind::InvalidToken,
            RejectionKind::SessionExpired,
            RejectionKind::DuplicateCheckIn,
            RejectionKind::Forbidden,
            RejectionKind::Unavailable,
        ];
        let codes: std::collections::HashSet<u16> =
            kinds.iter().map(RejectionKind::code).collect();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_decode_unknown_client_message_type_returns_error() {
        let unknown = r#"{"type": "DeleteSession", "id": 1}"#;
        let result: Result<ClientMessage, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }
}
