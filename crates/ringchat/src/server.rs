//! `RingchatServer` builder and server loop.
//!
//! This is the entry point for running a Ringchat relay. It ties
//! together all the layers: transport → protocol → members → rooms.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ringchat_room::{ExchangeConfig, RegistryConfig, RoomRegistry};
use ringchat_session::{MemberConfig, MemberRegistry};
use ringchat_transport::{Connection, ConnectionConfig, Listener};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::RingchatError;
use crate::config::DEFAULT_ADDR;
use crate::handler::handle_connection;

/// Shared server state passed to each connection task.
pub(crate) struct ServerState {
    pub(crate) members: Arc<Mutex<MemberRegistry<Connection>>>,
    pub(crate) rooms: RoomRegistry<Connection>,
}

/// Builder for configuring and starting a Ringchat server.
///
/// # Example
///
/// ```rust,ignore
/// use ringchat::prelude::*;
///
/// let server = RingchatServer::builder()
///     .bind("0.0.0.0:8888")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct RingchatServerBuilder {
    bind_addr: String,
    connection_config: ConnectionConfig,
    registry_config: RegistryConfig,
    member_config: MemberConfig,
}

impl RingchatServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            connection_config: ConnectionConfig::default(),
            registry_config: RegistryConfig::default(),
            member_config: MemberConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Limits how long the server waits on each member during a key
    /// exchange. Unlimited by default.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.connection_config.request_timeout = Some(timeout);
        self
    }

    /// Sets the key exchange configuration.
    pub fn exchange_config(mut self, config: ExchangeConfig) -> Self {
        self.registry_config.exchange = config;
        self
    }

    /// Caps the number of simultaneously connected members.
    pub fn max_members(mut self, limit: usize) -> Self {
        self.member_config.max_members = Some(limit);
        self
    }

    /// Binds the listener and builds the server.
    pub async fn build(self) -> Result<RingchatServer, RingchatError> {
        let listener = Listener::bind(&self.bind_addr, self.connection_config).await?;

        let members = Arc::new(Mutex::new(MemberRegistry::new(self.member_config)));
        let rooms = RoomRegistry::new(Arc::clone(&members), self.registry_config);
        let state = Arc::new(ServerState { members, rooms });

        Ok(RingchatServer { listener, state })
    }
}

impl Default for RingchatServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Ringchat server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RingchatServer {
    listener: Listener,
    state: Arc<ServerState>,
}

impl RingchatServer {
    /// Creates a new builder.
    pub fn builder() -> RingchatServerBuilder {
        RingchatServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop.
    ///
    /// Spawns a tracked task for each accepted connection. Accept errors
    /// are logged and never end the loop. Runs until the future is
    /// dropped; dropping it aborts every connection task.
    pub async fn run(mut self) -> Result<(), RingchatError> {
        tracing::info!(addr = ?self.local_addr().ok(), "ringchat server running");
        let mut connections = JoinSet::new();

        loop {
            match self.listener.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    connections.spawn(async move {
                        let conn_id = conn.id();
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(%conn_id, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }

            while let Some(finished) = connections.try_join_next() {
                if let Err(e) = finished {
                    tracing::error!(error = %e, "connection task panicked");
                }
            }
        }
    }
}
