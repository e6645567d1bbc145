//! TCP listener producing framed [`Connection`]s.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::{Connection, ConnectionConfig, ConnectionId, TransportError};

/// Accepts incoming TCP connections and wraps each in a [`Connection`].
pub struct Listener {
    listener: TcpListener,
    config: ConnectionConfig,
    next_id: u64,
}

impl Listener {
    /// Binds to `addr`. Use port `0` to let the OS pick one.
    pub async fn bind(addr: &str, config: ConnectionConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self {
            listener,
            config,
            next_id: 1,
        })
    }

    /// Waits for and accepts the next incoming connection.
    pub async fn accept(&mut self) -> Result<Connection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        tracing::debug!(%id, %addr, "accepted TCP connection");

        Ok(Connection::new(stream, id, self.config.clone()))
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
