//! Attendance sessions for Rollcall.
//!
//! This crate owns the first half of the attendance flow:
//!
//! 1. **Identity**: turning a connection credential into a user and role
//!    ([`IdentityProvider`] trait)
//! 2. **Session creation**: validating a teacher's request, issuing an
//!    unguessable check-in token and persisting it ([`SessionStore`])
//! 3. **Token resolution**: exact-match lookup of a presented token
//!
//! # How it fits in the stack
//!
//! ```text
//! Check-in Layer (above)  ← resolves tokens, records attendance
//!     ↕
//! Session Layer (this crate)  ← creates sessions, resolves tokens
//!     ↕
//! Store Layer (below)  ← SessionRepository implementations
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod policy;
mod store;
pub mod token;

pub use auth::{IdentityProvider, StaticIdentityProvider};
pub use error::{IdentityError, SessionError, ValidationError};
pub use policy::SessionPolicy;
pub use store::{SessionStore, is_valid};
