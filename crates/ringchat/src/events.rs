//! The surface a chat front end talks to.
//!
//! A UI never touches the connection. It reads [`ClientEvent`]s from
//! [`ChatClient::subscribe`] and feeds [`ClientCommand`]s back, either
//! directly through [`ChatClient::execute`] or through a channel drained
//! by [`spawn_command_loop`].
//!
//! Both enums serialize with a `type` tag so a non-Rust front end can
//! bridge them over its own IPC.

use std::sync::Arc;

use ringchat_protocol::{ChatMessage, InviteCode, RoomId, RoomInfo};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{ChatClient, RingchatError};

/// Something the UI should show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// A chat line arrived (already decrypted).
    MessageReceived { message: ChatMessage },
    /// A room this client asked for was created.
    RoomCreated { room: RoomInfo, invite_code: InviteCode },
    /// A new room key is active for `room_id`.
    RoomKeyed { room_id: RoomId, fingerprint: String },
    /// The connection to the server is gone.
    Disconnected,
}

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    SendMessage { room_id: RoomId, text: String },
    CreateRoom { name: String },
    JoinRoom { invite_code: InviteCode },
    LeaveRoom { room_id: RoomId },
}

impl ChatClient {
    /// Runs one command to completion.
    pub async fn execute(&self, command: ClientCommand) -> Result<(), RingchatError> {
        match command {
            ClientCommand::SendMessage { room_id, text } => {
                self.send_message(&room_id, &text).await
            }
            ClientCommand::CreateRoom { name } => self.create_room(&name).await.map(|_| ()),
            ClientCommand::JoinRoom { invite_code } => {
                self.join_room(&invite_code).await.map(|_| ())
            }
            ClientCommand::LeaveRoom { room_id } => self.leave_room(&room_id).await,
        }
    }
}

/// Executes commands from `commands` in order until the sender side is
/// dropped. A failed command is logged and the loop moves on.
pub fn spawn_command_loop(
    client: Arc<ChatClient>,
    mut commands: mpsc::Receiver<ClientCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            tracing::debug!(member_id = %client.member_id(), ?command, "executing command");
            if let Err(e) = client.execute(command).await {
                tracing::warn!(member_id = %client.member_id(), error = %e, "command failed");
            }
        }
        tracing::debug!(member_id = %client.member_id(), "command channel closed");
    })
}
