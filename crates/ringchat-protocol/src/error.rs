//! Error types for the protocol layer.
//!
//! Each crate in Ringchat defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in turning bytes into typed
//! messages (or back), not in networking or room management.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing or mistyped
    /// field, or an unknown nested discriminant.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The top-level value has no `type` discriminant.
    #[error("message has no type discriminant")]
    MissingType,

    /// The top-level `type` discriminant names no known message.
    #[error("unknown message type: {0}")]
    UnknownType(String),
}
