//! Shared vocabulary for Rollcall.
//!
//! This crate defines everything the other layers agree on:
//!
//! - **Identity** ([`UserId`], [`Role`], [`Identity`]): who is calling.
//! - **Entities** ([`Session`], [`AttendanceRecord`]) and the read
//!   projections built from them ([`SessionSummary`], [`AttendanceEntry`]).
//! - **Messages** ([`Envelope`], [`ClientMessage`], [`ServerMessage`]):
//!   what travels over the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! # Architecture
//!
//! The protocol layer is the bottom of the stack. It knows nothing about
//! storage, tokens, or sockets: only the shapes of the data.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Service (identity + core)
//! ```

mod codec;
mod error;
mod message;
mod model;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{ClientMessage, Envelope, RejectionKind, ServerMessage};
pub use model::{
    AttendanceEntry, AttendanceRecord, AttendanceStatus, Session,
    SessionSummary, StudentOverview, TeacherOverview,
};
pub use types::{Identity, RecordId, Role, SessionId, UserId};
