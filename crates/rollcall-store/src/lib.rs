//! Storage seam for Rollcall.
//!
//! The core never talks to a database directly. It talks to two traits:
//!
//! - [`SessionRepository`]: persists and looks up sessions
//! - [`AttendanceRepository`]: persists attendance records with an atomic
//!   uniqueness guarantee on `(session_id, student_id)`
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryStore`]: maps behind a single async mutex; for tests and demos
//! - [`SqliteStore`]: relational tables with `UNIQUE` constraints
//!   (feature `sqlite`, on by default)
//!
//! # How it fits in the stack
//!
//! ```text
//! Check-in layer   ← inserts records, reads history
//!     ↕
//! Session layer    ← inserts sessions, resolves tokens
//!     ↕
//! Store layer (this crate)  ← owns atomicity and the deadline contract
//!     ↕
//! Protocol layer   ← provides Session, AttendanceRecord, ids
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod memory;
mod repository;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use error::{StoreError, UniqueKey};
pub use memory::MemoryStore;
pub use repository::{AttendanceRepository, SessionRepository, with_deadline};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
