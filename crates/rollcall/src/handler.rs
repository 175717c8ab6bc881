//! Per-connection handler: handshake, identity, and request dispatch.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version
//!   2. Resolve credential → get Identity
//!   3. Send HandshakeAck
//!   4. Loop: receive a request → call the service → send exactly one
//!      reply with `reply_to` set to the request's `seq`
//!
//! ## Errors: which ones end the connection?
//!
//! Two very different kinds of failure pass through this module:
//!
//! - **Request outcomes**: a duplicate check-in, an expired token, a
//!   student asking to open a session. These are answers, not failures of
//!   the connection. They become a `Rejected` reply and the loop goes on.
//! - **Connection failures**: the socket closed, a send failed, the client
//!   went quiet past the idle timeout. Nothing more can be said on this
//!   connection, so the handler returns and the task ends.
//!
//! The split is made once, in [`RollcallError::rejection`]. A reply kind
//! means "tell the client"; `None` means a server fault, which is logged
//! and answered with a generic `Error 500` so internals never reach the
//! wire.
//!
//! ## Why `reply_to`?
//!
//! Replies carry the `seq` of the request they answer. A client may
//! pipeline several requests without waiting, and the server's own `seq`
//! counter is independent of the client's, so matching by order alone
//! would break as soon as one frame fails to decode.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rollcall_protocol::{
    ClientMessage, Codec, Envelope, Identity, ProtocolError, RejectionKind, ServerMessage,
    StudentOverview, TeacherOverview,
};
use rollcall_session::{IdentityError, IdentityProvider};
use rollcall_store::{AttendanceRepository, SessionRepository};
use rollcall_transport::{Connection, WebSocketConnection};

use crate::RollcallError;
use crate::server::{PROTOCOL_VERSION, ServerState};

/// Per-connection outbound state: sequence counter and clock origin.
///
/// Every frame the server sends goes through here, so `seq` is strictly
/// increasing per connection and `timestamp` is milliseconds since the
/// connection was accepted.
struct Outbound<'a, C> {
    conn: &'a WebSocketConnection,
    codec: &'a C,
    seq: u64,
    start: Instant,
}

impl<C: Codec> Outbound<'_, C> {
    async fn send(
        &mut self,
        reply_to: Option<u64>,
        message: ServerMessage,
    ) -> Result<(), RollcallError> {
        let envelope = Envelope {
            seq: next_seq(&mut self.seq),
            timestamp: self.start.elapsed().as_millis() as u64,
            reply_to,
            message,
        };
        let bytes = self.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn send_error(
        &mut self,
        reply_to: Option<u64>,
        code: u16,
        message: impl Into<String>,
    ) -> Result<(), RollcallError> {
        self.send(
            reply_to,
            ServerMessage::Error {
                code,
                message: message.into(),
            },
        )
        .await
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<R, I, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<R, I, C>>,
) -> Result<(), RollcallError>
where
    R: SessionRepository + AttendanceRepository,
    I: IdentityProvider,
    C: Codec,
{
    let conn_id = conn.id();
    let peer = conn.peer_addr();
    tracing::debug!(%conn_id, %peer, "handling new connection");

    let mut out = Outbound {
        conn: &conn,
        codec: &state.codec,
        seq: 1,
        start: Instant::now(),
    };

    // --- Step 1: Handshake ---
    let identity = match perform_handshake(&mut out, &state).await {
        Ok(identity) => identity,
        Err(e) => {
            let _ = conn.close().await;
            return Err(e);
        }
    };
    tracing::info!(
        %conn_id,
        user_id = %identity.user_id,
        role = %identity.role,
        "client authenticated"
    );

    // --- Step 2: Request loop ---
    loop {
        let data = match tokio::time::timeout(state.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%conn_id, user_id = %identity.user_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%conn_id, user_id = %identity.user_id, "connection idle, closing");
                let _ = conn.close().await;
                break;
            }
        };

        let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode envelope");
                out.send_error(None, 400, format!("invalid message: {e}")).await?;
                continue;
            }
        };

        let request_seq = envelope.seq;
        let reply = match envelope.message {
            ClientMessage::Disconnect { reason } => {
                tracing::info!(%conn_id, user_id = %identity.user_id, %reason, "client disconnected");
                let _ = conn.close().await;
                break;
            }
            message => dispatch(&state, &identity, message).await,
        };
        out.send(Some(request_seq), reply).await?;
    }

    Ok(())
}

/// Receives and validates the Handshake, resolves the credential, and
/// sends HandshakeAck. Failures are reported to the client as `Error`
/// before returning.
async fn perform_handshake<R, I, C>(
    out: &mut Outbound<'_, C>,
    state: &ServerState<R, I, C>,
) -> Result<Identity, RollcallError>
where
    I: IdentityProvider,
    C: Codec,
{
    let data = match tokio::time::timeout(state.handshake_timeout, out.conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before handshake".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            out.send_error(None, 408, "handshake timed out").await?;
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            out.send_error(None, 400, "expected Handshake").await?;
            return Err(e.into());
        }
    };
    let seq = envelope.seq;

    let (version, credential) = match envelope.message {
        ClientMessage::Handshake {
            version,
            credential,
        } => (version, credential),
        _ => {
            out.send_error(Some(seq), 400, "expected Handshake").await?;
            return Err(
                ProtocolError::InvalidMessage("first message must be Handshake".into()).into(),
            );
        }
    };

    if version != PROTOCOL_VERSION {
        out.send_error(
            Some(seq),
            400,
            format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let identity = match state.identity.resolve(&credential).await {
        Ok(identity) => identity,
        Err(e @ IdentityError::Unauthenticated) => {
            out.send_error(Some(seq), 401, "unauthorized").await?;
            return Err(e.into());
        }
        Err(e @ IdentityError::Unavailable(_)) => {
            tracing::warn!(error = %e, "identity provider unavailable");
            out.send_error(Some(seq), 503, "identity provider unavailable")
                .await?;
            return Err(e.into());
        }
    };

    out.send(
        Some(seq),
        ServerMessage::HandshakeAck {
            user_id: identity.user_id.clone(),
            role: identity.role,
            server_time: Utc::now().timestamp_millis() as u64,
        },
    )
    .await?;

    Ok(identity)
}

/// Runs one request against the service and builds its reply.
async fn dispatch<R, I, C>(
    state: &ServerState<R, I, C>,
    identity: &Identity,
    message: ClientMessage,
) -> ServerMessage
where
    R: SessionRepository + AttendanceRepository,
{
    let service = &state.service;
    let result = match message {
        ClientMessage::Heartbeat { client_time } => Ok(ServerMessage::HeartbeatAck {
            client_time,
            server_time: Utc::now().timestamp_millis() as u64,
        }),

        ClientMessage::CreateSession {
            subject,
            duration_minutes,
        } => {
            let duration = Duration::from_secs(u64::from(duration_minutes) * 60);
            service
                .create_session(identity, &subject, duration)
                .await
                .map(|session| ServerMessage::SessionCreated { session })
        }

        ClientMessage::CheckIn { token } => service
            .check_in(identity, &token)
            .await
            .map(|record| ServerMessage::CheckedIn { record }),

        ClientMessage::ListSessions => {
            service
                .list_sessions(identity)
                .await
                .map(|sessions| ServerMessage::SessionList {
                    overview: TeacherOverview::from_summaries(&sessions),
                    sessions,
                })
        }

        ClientMessage::ListAttendance => {
            service
                .list_attendance(identity)
                .await
                .map(|entries| ServerMessage::AttendanceList {
                    overview: StudentOverview::from_entries(&entries),
                    entries,
                })
        }

        ClientMessage::Handshake { .. } => {
            return ServerMessage::Error {
                code: 400,
                message: "already handshaken".into(),
            };
        }

        ClientMessage::Disconnect { .. } => {
            return ServerMessage::Error {
                code: 400,
                message: "disconnect is not a request".into(),
            };
        }
    };

    result.unwrap_or_else(|e| rejection_reply(identity, &e))
}

/// Turns a failed request into the message the client sees.
fn rejection_reply(identity: &Identity, err: &RollcallError) -> ServerMessage {
    match err.rejection() {
        Some(RejectionKind::Unavailable) => {
            tracing::warn!(user_id = %identity.user_id, error = %err, "request failed");
            ServerMessage::Rejected {
                kind: RejectionKind::Unavailable,
                message: "service temporarily unavailable, try again".into(),
            }
        }
        Some(kind) => ServerMessage::Rejected {
            kind,
            message: err.to_string(),
        },
        None => {
            tracing::error!(user_id = %identity.user_id, error = %err, "request failed");
            ServerMessage::Error {
                code: 500,
                message: "internal error".into(),
            }
        }
    }
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
