//! Integration tests for the Rollcall server, handler, and full connection flow.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rollcall::prelude::*;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn identities() -> StaticIdentityProvider {
    StaticIdentityProvider::new()
        .with("key-teacher", Identity::teacher("teacher-1"))
        .with("key-alice", Identity::student("student-a"))
        .with("key-bob", Identity::student("student-b"))
}

/// Starts a server on a random port and returns the address.
async fn start_server_with(builder: RollcallServerBuilder) -> String {
    let service = AttendanceService::new(
        Arc::new(MemoryStore::new()),
        SessionPolicy::default(),
        CheckInConfig::default(),
    );
    let server = builder
        .bind("127.0.0.1:0")
        .build(service, identities())
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("should have local addr").to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn start_server() -> String {
    start_server_with(RollcallServer::builder()).await
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, seq: u64, message: ClientMessage) {
    let envelope = Envelope::new(seq, 0, message);
    let json = serde_json::to_string(&envelope).expect("encode");
    ws.send(Message::Text(json.into())).await.expect("send");
}

async fn recv(ws: &mut ClientWs) -> Envelope<ServerMessage> {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("reply within 5s")
        .expect("stream open")
        .expect("frame ok");
    serde_json::from_slice(&msg.into_data()).expect("decode")
}

/// Sends a request and returns the reply, checking `reply_to`.
async fn request(ws: &mut ClientWs, seq: u64, message: ClientMessage) -> ServerMessage {
    send(ws, seq, message).await;
    let reply = recv(ws).await;
    assert_eq!(reply.reply_to, Some(seq));
    reply.message
}

async fn handshake(ws: &mut ClientWs, credential: &str) -> ServerMessage {
    request(
        ws,
        0,
        ClientMessage::Handshake {
            version: PROTOCOL_VERSION,
            credential: credential.into(),
        },
    )
    .await
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_handshake_known_credential_acks_with_identity() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    match handshake(&mut ws, "key-teacher").await {
        ServerMessage::HandshakeAck { user_id, role, .. } => {
            assert_eq!(user_id, UserId::new("teacher-1"));
            assert_eq!(role, Role::Teacher);
        }
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_unknown_credential_returns_401() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    match handshake(&mut ws, "key-mallory").await {
        ServerMessage::Error { code, .. } => assert_eq!(code, 401),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_wrong_version_returns_400() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let reply = request(
        &mut ws,
        0,
        ClientMessage::Handshake {
            version: PROTOCOL_VERSION + 1,
            credential: "key-teacher".into(),
        },
    )
    .await;

    assert!(matches!(reply, ServerMessage::Error { code: 400, .. }));
}

#[tokio::test]
async fn test_first_message_not_handshake_returns_400() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let reply = request(&mut ws, 3, ClientMessage::ListSessions).await;

    assert!(matches!(reply, ServerMessage::Error { code: 400, .. }));
}

#[tokio::test]
async fn test_check_in_flow_over_websocket() {
    let addr = start_server().await;

    let mut teacher = connect(&addr).await;
    handshake(&mut teacher, "key-teacher").await;
    let session = match request(
        &mut teacher,
        1,
        ClientMessage::CreateSession {
            subject: "Algebra I".into(),
            duration_minutes: 30,
        },
    )
    .await
    {
        ServerMessage::SessionCreated { session } => session,
        other => panic!("expected SessionCreated, got {other:?}"),
    };
    assert_eq!(session.subject, "Algebra I");

    let mut alice = connect(&addr).await;
    handshake(&mut alice, "key-alice").await;

    let check_in = ClientMessage::CheckIn {
        token: session.token.clone(),
    };
    match request(&mut alice, 1, check_in.clone()).await {
        ServerMessage::CheckedIn { record } => {
            assert_eq!(record.session_id, session.id);
            assert_eq!(record.status, AttendanceStatus::Present);
        }
        other => panic!("expected CheckedIn, got {other:?}"),
    }

    match request(&mut alice, 2, check_in).await {
        ServerMessage::Rejected { kind, .. } => assert_eq!(kind, RejectionKind::DuplicateCheckIn),
        other => panic!("expected Rejected, got {other:?}"),
    }

    match request(
        &mut alice,
        3,
        ClientMessage::CheckIn {
            token: "fabricated".into(),
        },
    )
    .await
    {
        ServerMessage::Rejected { kind, .. } => assert_eq!(kind, RejectionKind::InvalidToken),
        other => panic!("expected Rejected, got {other:?}"),
    }

    match request(&mut alice, 4, ClientMessage::ListAttendance).await {
        ServerMessage::AttendanceList { entries, overview } => {
            assert_eq!(entries.len(), 1);
            assert_eq!(overview.attendance_rate, 100);
        }
        other => panic!("expected AttendanceList, got {other:?}"),
    }

    match request(&mut teacher, 2, ClientMessage::ListSessions).await {
        ServerMessage::SessionList { sessions, overview } => {
            assert_eq!(sessions.len(), 1);
            assert_eq!(sessions[0].attendance_count, 1);
            assert_eq!(overview.total_check_ins, 1);
            assert_eq!(overview.open_sessions, 1);
        }
        other => panic!("expected SessionList, got {other:?}"),
    }
}

#[tokio::test]
async fn test_role_violation_is_rejected_not_fatal() {
    let addr = start_server().await;
    let mut bob = connect(&addr).await;
    handshake(&mut bob, "key-bob").await;

    let reply = request(
        &mut bob,
        1,
        ClientMessage::CreateSession {
            subject: "Chemistry".into(),
            duration_minutes: 30,
        },
    )
    .await;
    assert!(matches!(
        reply,
        ServerMessage::Rejected {
            kind: RejectionKind::Forbidden,
            ..
        }
    ));

    // The connection is still usable.
    let reply = request(&mut bob, 2, ClientMessage::Heartbeat { client_time: 42 }).await;
    assert!(matches!(
        reply,
        ServerMessage::HeartbeatAck {
            client_time: 42,
            ..
        }
    ));
}

#[tokio::test]
async fn test_invalid_duration_is_validation_rejection() {
    let addr = start_server().await;
    let mut teacher = connect(&addr).await;
    handshake(&mut teacher, "key-teacher").await;

    let reply = request(
        &mut teacher,
        1,
        ClientMessage::CreateSession {
            subject: "Algebra I".into(),
            duration_minutes: 181,
        },
    )
    .await;

    assert!(matches!(
        reply,
        ServerMessage::Rejected {
            kind: RejectionKind::Validation,
            ..
        }
    ));
}

#[tokio::test]
async fn test_undecodable_frame_gets_error_and_connection_survives() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws, "key-alice").await;

    ws.send(Message::Text("{not json".into())).await.unwrap();
    let reply = recv(&mut ws).await;
    assert_eq!(reply.reply_to, None);
    assert!(matches!(reply.message, ServerMessage::Error { code: 400, .. }));

    let reply = request(&mut ws, 5, ClientMessage::Heartbeat { client_time: 1 }).await;
    assert!(matches!(reply, ServerMessage::HeartbeatAck { .. }));
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let builder = RollcallServer::builder().idle_timeout(Duration::from_millis(100));
    let addr = start_server_with(builder).await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws, "key-alice").await;

    let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("server should close the idle connection");
    assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}
