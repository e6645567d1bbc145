//! Codec trait and implementations for turning messages into frame bodies.
//!
//! The transport doesn't care HOW a [`Message`] becomes bytes; it holds
//! something that implements [`Codec`] and calls it for every frame.
//! [`JsonCodec`] is the only implementation today.

use crate::{Message, ProtocolError};

/// Converts [`Message`]s to bytes and back.
///
/// The trait is object safe so a connection can hold an
/// `Arc<dyn Codec>` without becoming generic over it.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a message into a frame body.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a frame body. Either the whole message decodes or
    /// the call fails; there is no partial result.
    ///
    /// # Errors
    /// - `ProtocolError::MissingType` — no top-level `type` field
    /// - `ProtocolError::UnknownType` — `type` is not a known message
    /// - `ProtocolError::Decode` — malformed JSON or wrong field shapes
    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use ringchat_protocol::{Codec, JsonCodec, Message, Request, RequestPayload};
///
/// let codec = JsonCodec;
/// let msg = Message::Request(Request::new(RequestPayload::CreateRoom {
///     name: "lobby".into(),
/// }));
///
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(message).map_err(ProtocolError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        // Parse once into a `Value` so the discriminant can be checked
        // against the closed registry before the typed decode. This
        // gives callers a precise error for foreign or truncated input.
        let value: serde_json::Value =
            serde_json::from_slice(data).map_err(ProtocolError::Decode)?;

        match value.get("type") {
            None => return Err(ProtocolError::MissingType),
            Some(serde_json::Value::String(tag)) => {
                if !Message::TYPES.contains(&tag.as_str()) {
                    return Err(ProtocolError::UnknownType(tag.clone()));
                }
            }
            Some(other) => return Err(ProtocolError::UnknownType(other.to_string())),
        }

        serde_json::from_value(value).map_err(ProtocolError::Decode)
    }
}
