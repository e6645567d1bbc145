use std::time::Duration;

use ringchat_protocol::{ProtocolError, RequestKind, ResponseError};

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed before the operation completed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Dialing the server failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The byte stream does not hold a well-formed frame: a truncated
    /// header or body, or a length over the limit. The connection is
    /// unusable after this.
    #[error("framing error: {0}")]
    Framing(String),

    /// A message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// No response arrived within the allowed time.
    #[error("{kind} request timed out after {after:?}")]
    Timeout { kind: RequestKind, after: Duration },

    /// The peer answered with an error response.
    #[error("remote error: {0}")]
    Remote(#[from] ResponseError),

    /// `run()` was called a second time on the same connection.
    #[error("receive loop already running")]
    AlreadyRunning,
}
