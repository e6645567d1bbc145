//! Unified error type for Ringchat.

use ringchat_crypto::CryptoError;
use ringchat_protocol::ProtocolError;
use ringchat_room::RoomError;
use ringchat_session::SessionError;
use ringchat_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RingchatError {
    /// A transport-level error (connect, send, timeout, remote error).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A key agreement or encryption error.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A member registry error (server full).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room registry error.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The server never sent `Welcome`.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server answered with a payload of the wrong kind.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}
