//! Framed TCP transport for Ringchat.
//!
//! Provides [`Connection`], a duplex channel that speaks
//! length-prefixed JSON frames and correlates requests with responses,
//! and [`Listener`], which accepts them.
//!
//! The [`framing`] module is public so tests and tools can talk to a
//! connection with raw frames.

pub mod framing;

mod connection;
mod error;
mod listener;

pub use connection::{Connection, ConnectionConfig, HandlerResult};
pub use error::TransportError;
pub use listener::Listener;

use std::fmt;

/// Opaque identifier for a connection, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
