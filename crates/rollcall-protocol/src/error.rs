//! Error types for the protocol layer.
//!
//! Each crate in Rollcall defines its own error enum. A `ProtocolError`
//! always means the problem is in the shape of the data (serialization,
//! unknown enum labels), never in storage or networking.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or an
    /// unknown `type` tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message is invalid at the protocol level.
    ///
    /// For values that parse but break protocol rules, e.g. a role label
    /// that is neither `teacher` nor `student`.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
