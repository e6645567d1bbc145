//! The member side of Ringchat.
//!
//! A [`ChatClient`] holds one connection to the server and, for every
//! room it is in, a private [`KeyPair`] and the [`RoomCipher`] from the
//! last exchange it terminated. The server drives the exchange; the
//! client only answers with values derived from its own secret.

use std::collections::HashMap;
use std::future::{Ready, ready};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ringchat_crypto::{KeyPair, RoomCipher, derive_cipher};
use ringchat_protocol::{
    ChatMessage, ChatPayload, DhValue, ErrorCode, InviteCode, MemberId, RequestKind,
    RequestPayload, ResponseError, ResponsePayload, RoomId, RoomInfo,
};
use ringchat_transport::{Connection, ConnectionConfig, HandlerResult, TransportError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::{ClientConfig, ClientEvent, RingchatError};

/// One room's key material.
struct RoomKeys {
    key_pair: KeyPair,
    cipher: Option<RoomCipher>,
}

impl RoomKeys {
    fn new() -> Self {
        Self {
            key_pair: KeyPair::generate(),
            cipher: None,
        }
    }
}

type KeyStore = Arc<Mutex<HashMap<RoomId, RoomKeys>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connected chat member.
pub struct ChatClient {
    conn: Connection,
    member_id: MemberId,
    keys: KeyStore,
    events: broadcast::Sender<ClientEvent>,
    receive_task: JoinHandle<Result<(), TransportError>>,
}

impl ChatClient {
    /// Dials the server, starts the receive loop, and waits for the
    /// server to assign a member id.
    ///
    /// # Errors
    /// - [`RingchatError::Transport`] if the server cannot be reached
    /// - [`RingchatError::Handshake`] if no `Welcome` arrives within
    ///   [`ClientConfig::welcome_timeout`]
    pub async fn connect(config: ClientConfig) -> Result<Self, RingchatError> {
        let conn = Connection::connect(
            &config.server_addr,
            ConnectionConfig {
                request_timeout: config.request_timeout,
            },
        )
        .await?;

        let keys: KeyStore = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let (welcome_tx, welcome_rx) = oneshot::channel();
        let welcome_tx = Mutex::new(Some(welcome_tx));
        conn.register_handler(RequestKind::Welcome, move |payload| {
            if let RequestPayload::Welcome { member_id } = payload {
                if let Some(tx) = lock(&welcome_tx).take() {
                    let _ = tx.send(member_id);
                }
            }
            ack()
        });
        register_key_handlers(&conn, &keys, &events);
        register_delivery_handler(&conn, &keys, &events);

        let disconnected = events.clone();
        conn.on_disconnect(move || {
            let _ = disconnected.send(ClientEvent::Disconnected);
        });

        let receiver = conn.clone();
        let receive_task = tokio::spawn(async move { receiver.run().await });

        let member_id = match tokio::time::timeout(config.welcome_timeout, welcome_rx).await {
            Ok(Ok(member_id)) => member_id,
            Ok(Err(_)) => {
                receive_task.abort();
                return Err(RingchatError::Handshake(
                    "connection closed before welcome".into(),
                ));
            }
            Err(_) => {
                receive_task.abort();
                return Err(RingchatError::Handshake("welcome timed out".into()));
            }
        };
        tracing::info!(%member_id, addr = %config.server_addr, "connected to server");

        Ok(Self {
            conn,
            member_id,
            keys,
            events,
            receive_task,
        })
    }

    /// The id the server assigned to this client.
    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    /// Returns a receiver for everything this client observes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Fingerprint of the key currently installed for `room_id`, if any.
    pub fn room_fingerprint(&self, room_id: &RoomId) -> Option<String> {
        lock(&self.keys)
            .get(room_id)
            .and_then(|keys| keys.cipher.as_ref())
            .map(|cipher| cipher.fingerprint().to_string())
    }

    /// Returns `true` once the connection to the server is gone.
    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    /// Creates a room and emits [`ClientEvent::RoomCreated`].
    pub async fn create_room(&self, name: &str) -> Result<(RoomInfo, InviteCode), RingchatError> {
        let response = self
            .conn
            .request(RequestPayload::CreateRoom {
                name: name.to_string(),
            })
            .await?;
        let ResponsePayload::RoomCreated { room, invite_code } = response else {
            return Err(RingchatError::UnexpectedResponse(format!(
                "expected RoomCreated, got {response:?}"
            )));
        };

        tracing::info!(
            member_id = %self.member_id,
            room_id = %room.room_id,
            %invite_code,
            "room created"
        );
        let _ = self.events.send(ClientEvent::RoomCreated {
            room: room.clone(),
            invite_code: invite_code.clone(),
        });
        Ok((room, invite_code))
    }

    /// Joins the room behind `invite_code`.
    ///
    /// # Errors
    /// An unknown code surfaces as [`RingchatError::Transport`] wrapping
    /// a remote error with [`ErrorCode::InvalidInvite`].
    pub async fn join_room(&self, invite_code: &InviteCode) -> Result<RoomInfo, RingchatError> {
        let response = self
            .conn
            .request(RequestPayload::JoinRoom {
                invite_code: invite_code.clone(),
            })
            .await?;
        let ResponsePayload::RoomJoined { room } = response else {
            return Err(RingchatError::UnexpectedResponse(format!(
                "expected RoomJoined, got {response:?}"
            )));
        };

        tracing::info!(member_id = %self.member_id, room_id = %room.room_id, "joined room");
        Ok(room)
    }

    /// Leaves `room_id` and forgets its keys.
    pub async fn leave_room(&self, room_id: &RoomId) -> Result<(), RingchatError> {
        self.conn
            .request(RequestPayload::LeaveRoom {
                room_id: room_id.clone(),
            })
            .await?;
        lock(&self.keys).remove(room_id);
        tracing::info!(member_id = %self.member_id, %room_id, "left room");
        Ok(())
    }

    /// Sends `text` to `room_id`, sealed with the room key when one is
    /// installed. Before the first exchange completes the text goes out
    /// in the clear.
    pub async fn send_message(&self, room_id: &RoomId, text: &str) -> Result<(), RingchatError> {
        let message = ChatMessage {
            room_id: room_id.clone(),
            sender_id: self.member_id,
            text: text.to_string(),
        };
        let payload = {
            let keys = lock(&self.keys);
            match keys.get(room_id).and_then(|k| k.cipher.as_ref()) {
                Some(cipher) => ChatPayload::EncryptedChatMessage(cipher.encrypt(&message)?),
                None => {
                    tracing::debug!(%room_id, "no room key yet, sending plaintext");
                    ChatPayload::ChatMessage(message)
                }
            }
        };

        self.conn
            .request(RequestPayload::PostMessage { message: payload })
            .await?;
        Ok(())
    }

    /// Closes the connection and waits for the receive loop to end.
    pub async fn close(self) {
        self.conn.close().await;
        match self.receive_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(member_id = %self.member_id, error = %e, "receive loop ended")
            }
            Err(e) => {
                tracing::debug!(member_id = %self.member_id, error = %e, "receive task failed")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Request handlers
// ---------------------------------------------------------------------------

fn ack() -> Ready<HandlerResult> {
    ready(Ok(ResponsePayload::Ack))
}

fn bad_request(detail: impl std::fmt::Display) -> ResponseError {
    ResponseError::new(ErrorCode::BadRequest, detail.to_string())
}

fn unexpected(kind: RequestKind) -> ResponseError {
    bad_request(format!("payload does not match {kind}"))
}

/// Each handler works only with the secret held in `keys`.
fn register_key_handlers(
    conn: &Connection,
    keys: &KeyStore,
    events: &broadcast::Sender<ClientEvent>,
) {
    let store = Arc::clone(keys);
    conn.register_handler(RequestKind::GetPublicKey, move |payload| {
        ready(public_key(&store, payload))
    });

    let store = Arc::clone(keys);
    conn.register_handler(RequestKind::GetMixedKey, move |payload| {
        ready(mixed_key(&store, payload))
    });

    let store = Arc::clone(keys);
    let events = events.clone();
    conn.register_handler(RequestKind::PostFinalKey, move |payload| {
        ready(install_final_key(&store, &events, payload))
    });

    let store = Arc::clone(keys);
    conn.register_handler(RequestKind::RegenerateKeyPair, move |payload| {
        ready(regenerate(&store, payload))
    });
}

fn public_key(keys: &KeyStore, payload: RequestPayload) -> HandlerResult {
    let RequestPayload::GetPublicKey { room_id } = payload else {
        return Err(unexpected(RequestKind::GetPublicKey));
    };
    let mut keys = lock(keys);
    let entry = keys.entry(room_id).or_insert_with(RoomKeys::new);
    Ok(ResponsePayload::PublicKey {
        value: entry.key_pair.public().clone(),
    })
}

fn mixed_key(keys: &KeyStore, payload: RequestPayload) -> HandlerResult {
    let RequestPayload::GetMixedKey { room_id, key } = payload else {
        return Err(unexpected(RequestKind::GetMixedKey));
    };
    let mut keys = lock(keys);
    let entry = keys.entry(room_id).or_insert_with(RoomKeys::new);
    let value = entry.key_pair.mix(&key).map_err(bad_request)?;
    Ok(ResponsePayload::PublicKey { value })
}

fn install_final_key(
    keys: &KeyStore,
    events: &broadcast::Sender<ClientEvent>,
    payload: RequestPayload,
) -> HandlerResult {
    let RequestPayload::PostFinalKey { room_id, key } = payload else {
        return Err(unexpected(RequestKind::PostFinalKey));
    };
    let fingerprint = match derive_room_cipher(keys, &room_id, &key) {
        Ok(fingerprint) => fingerprint,
        Err(e) => {
            tracing::warn!(%room_id, error = %e, "could not install room key");
            return Err(bad_request(e));
        }
    };

    tracing::info!(%room_id, %fingerprint, "room key installed");
    let _ = events.send(ClientEvent::RoomKeyed {
        room_id,
        fingerprint,
    });
    Ok(ResponsePayload::Ack)
}

fn derive_room_cipher(
    keys: &KeyStore,
    room_id: &RoomId,
    key: &DhValue,
) -> Result<String, RingchatError> {
    let mut keys = lock(keys);
    let entry = keys.entry(room_id.clone()).or_insert_with(RoomKeys::new);
    let shared = entry.key_pair.mix(key)?;
    let cipher = derive_cipher(&shared)?;
    let fingerprint = cipher.fingerprint().to_string();
    entry.cipher = Some(cipher);
    Ok(fingerprint)
}

fn regenerate(keys: &KeyStore, payload: RequestPayload) -> HandlerResult {
    let RequestPayload::RegenerateKeyPair { room_id } = payload else {
        return Err(unexpected(RequestKind::RegenerateKeyPair));
    };
    tracing::debug!(%room_id, "regenerating key pair");
    let mut keys = lock(keys);
    match keys.get_mut(&room_id) {
        Some(entry) => entry.key_pair = KeyPair::generate(),
        None => {
            keys.insert(room_id, RoomKeys::new());
        }
    }
    Ok(ResponsePayload::Ack)
}

fn register_delivery_handler(
    conn: &Connection,
    keys: &KeyStore,
    events: &broadcast::Sender<ClientEvent>,
) {
    let store = Arc::clone(keys);
    let events = events.clone();
    conn.register_handler(RequestKind::DeliverMessage, move |payload| {
        if let RequestPayload::DeliverMessage { message } = payload {
            if let Some(message) = open(&store, message) {
                let _ = events.send(ClientEvent::MessageReceived { message });
            }
        }
        ack()
    });
}

/// Decrypts a delivered payload. Anything that cannot be opened is
/// logged and dropped, and so is plaintext for a room that has a key.
fn open(keys: &KeyStore, payload: ChatPayload) -> Option<ChatMessage> {
    match payload {
        ChatPayload::ChatMessage(message) => {
            let keyed = lock(keys)
                .get(&message.room_id)
                .is_some_and(|k| k.cipher.is_some());
            if keyed {
                tracing::warn!(
                    room_id = %message.room_id,
                    sender_id = %message.sender_id,
                    "dropping plaintext in keyed room"
                );
                return None;
            }
            Some(message)
        }
        ChatPayload::EncryptedChatMessage(sealed) => {
            let keys = lock(keys);
            let Some(cipher) = keys.get(&sealed.room_id).and_then(|k| k.cipher.as_ref()) else {
                tracing::warn!(room_id = %sealed.room_id, "no room key, dropping message");
                return None;
            };
            match cipher.decrypt(&sealed) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!(
                        room_id = %sealed.room_id,
                        sender_id = %sealed.sender_id,
                        error = %e,
                        "dropping undecryptable message"
                    );
                    None
                }
            }
        }
    }
}
