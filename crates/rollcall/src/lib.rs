//! # Rollcall
//!
//! Classroom attendance over short-lived check-in tokens.
//!
//! A teacher opens a session for a subject and a duration and gets back a
//! token (rendered as a QR code by the client). Students present the
//! token to check in. Each student gets at most one record per session,
//! and a session stops accepting check-ins the instant it expires.
//!
//! The [`AttendanceService`] enforces who may do what; the
//! [`RollcallServer`] puts it on a WebSocket.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rollcall::prelude::*;
//!
//! # async fn run() -> Result<(), RollcallError> {
//! let config = ServerConfig::load()?;
//! let store = Arc::new(MemoryStore::new());
//! let service = AttendanceService::new(store, config.session_policy()?, config.check_in_config());
//!
//! let server = RollcallServerBuilder::from_config(&config)
//!     .build(service, config.identity_provider())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;
mod service;

pub use config::{IdentityEntry, ServerConfig};
pub use error::RollcallError;
pub use server::{PROTOCOL_VERSION, RollcallServer, RollcallServerBuilder};
pub use service::AttendanceService;

/// Everything needed to wire up and talk to a Rollcall server.
pub mod prelude {
    pub use crate::{
        AttendanceService, PROTOCOL_VERSION, RollcallError, RollcallServer,
        RollcallServerBuilder, ServerConfig,
    };
    pub use rollcall_checkin::{CheckInConfig, CheckInEngine, CheckInError, SessionPhase};
    pub use rollcall_protocol::{
        AttendanceEntry, AttendanceRecord, AttendanceStatus, ClientMessage, Codec, Envelope,
        Identity, JsonCodec, RejectionKind, Role, ServerMessage, Session, SessionId,
        SessionSummary, StudentOverview, TeacherOverview, UserId,
    };
    pub use rollcall_session::{
        IdentityError, IdentityProvider, SessionError, SessionPolicy, SessionStore,
        StaticIdentityProvider, ValidationError,
    };
    pub use rollcall_store::{
        AttendanceRepository, MemoryStore, SessionRepository, SqliteStore, StoreError,
    };
}
