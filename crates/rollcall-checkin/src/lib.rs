//! Student check-in for Rollcall.
//!
//! The engine turns a presented token into at most one attendance record
//! per student per session, and serves the attendance read views.
//!
//! # Key types
//!
//! - [`CheckInEngine`]: check-in and attendance reads over a store
//! - [`SessionPhase`]: Pending → Open → Closed, derived from the clock
//! - [`CheckInConfig`]: storage deadline
//! - [`CheckInError`]: the typed rejections and the storage fault

mod config;
mod engine;
mod error;

pub use config::{CheckInConfig, SessionPhase};
pub use engine::CheckInEngine;
pub use error::CheckInError;
