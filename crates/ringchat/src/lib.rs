//! # Ringchat
//!
//! End-to-end encrypted group chat relayed through an untrusted server.
//!
//! Members of a room agree on a shared key with a ring Diffie-Hellman
//! exchange that the server orchestrates but cannot complete. The server
//! only ever relays partial values and ciphertext.
//!
//! - [`RingchatServer`] accepts connections, hands out member ids, keeps
//!   the room registry, and rekeys rooms on every membership change.
//! - [`ChatClient`] is the member side: it answers the exchange from its
//!   own secrets, seals outgoing messages, and opens incoming ones.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ringchat::prelude::*;
//!
//! # async fn demo() -> Result<(), RingchatError> {
//! let server = RingchatServer::builder().bind("127.0.0.1:8888").build().await?;
//! tokio::spawn(server.run());
//!
//! let alice = ChatClient::connect(ClientConfig::new("127.0.0.1:8888")).await?;
//! let (room, invite) = alice.create_room("lobby").await?;
//! // share `invite`; others call join_room(&invite)
//! alice.send_message(&room.room_id, "hello").await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod events;
mod handler;
mod server;

pub use client::ChatClient;
pub use config::{ClientConfig, DEFAULT_ADDR};
pub use error::RingchatError;
pub use events::{ClientCommand, ClientEvent, spawn_command_loop};
pub use server::{RingchatServer, RingchatServerBuilder};

/// Everything needed to run a server or a client.
pub mod prelude {
    pub use crate::{
        ChatClient, ClientCommand, ClientConfig, ClientEvent, RingchatError, RingchatServer,
        RingchatServerBuilder, spawn_command_loop,
    };
    pub use ringchat_protocol::{ChatMessage, ErrorCode, InviteCode, MemberId, RoomId, RoomInfo};
    pub use ringchat_room::ExchangeConfig;
    pub use ringchat_transport::TransportError;
}
