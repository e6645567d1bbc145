//! Error types for the member registry.

use ringchat_protocol::MemberId;

/// Errors that can occur while registering or looking up members.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No member is registered under this id. Either it never connected
    /// or its connection already closed.
    #[error("member {0} not found")]
    NotFound(MemberId),

    /// The registry already holds its configured maximum.
    #[error("member limit of {limit} reached")]
    Full { limit: usize },
}
