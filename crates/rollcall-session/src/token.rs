//! Check-in token generation.
//!
//! A token has the shape `{owner}-{issued_ms}-{random}`, where `random`
//! is 32 lowercase hex characters (128 bits from a CSPRNG). The prefix
//! makes tokens readable in logs; the random tail is what makes them
//! unguessable.

use chrono::{DateTime, Utc};
use rand::Rng;
use rollcall_protocol::UserId;

/// Bytes of randomness in every token.
pub const RANDOM_BYTES: usize = 16;

/// Longest token the system issues or looks up, in bytes.
///
/// The owner prefix is caller-controlled, so session creation refuses
/// any owner whose token would exceed this; a lookup of a longer string
/// can then never match and is answered without touching storage.
pub const MAX_LEN: usize = 512;

/// Generates a fresh check-in token for a session opened by `owner_id`
/// at `issued_at`.
pub fn generate(owner_id: &UserId, issued_at: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let bytes: [u8; RANDOM_BYTES] = rng.random();
    let tail: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{owner_id}-{}-{tail}", issued_at.timestamp_millis())
}
