//! Client-side settings.

use std::time::Duration;

/// Address the server binds to, and clients dial, by default.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8888";

/// Settings for a [`ChatClient`](crate::ChatClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address to dial.
    pub server_addr: String,
    /// How long a request to the server may wait for its response.
    pub request_timeout: Option<Duration>,
    /// How long to wait for the server's `Welcome` after connecting.
    pub welcome_timeout: Duration,
    /// Capacity of the event channel handed out by
    /// [`subscribe`](crate::ChatClient::subscribe). Slow subscribers
    /// skip events past this.
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Default settings for dialing `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            server_addr: addr.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_ADDR.to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            welcome_timeout: Duration::from_secs(5),
            event_capacity: 256,
        }
    }
}
