//! Room registry: creates rooms, routes members in and out, triggers
//! rekeying, and relays chat payloads.
//!
//! # Locking
//!
//! Room state sits behind one `tokio::sync::Mutex`; the member registry
//! behind another. When both are needed the room lock is taken first.
//! Neither lock is held across a call to a member.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use ringchat_protocol::{ChatPayload, InviteCode, MemberId, RoomId, RoomInfo};
use ringchat_session::MemberRegistry;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::{ExchangeConfig, KeyExchange, MemberLink, RekeyOutcome, RoomError};

/// Settings for a [`RoomRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How many random invite codes to try before giving up on finding
    /// an unused one.
    pub invite_attempts: usize,
    /// Settings for the key exchanges this registry starts.
    pub exchange: ExchangeConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            invite_attempts: 64,
            exchange: ExchangeConfig::default(),
        }
    }
}

/// What happened to each recipient of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members the payload was handed to.
    pub delivered: Vec<MemberId>,
    /// Members that could not be reached, with the reason.
    pub failed: Vec<(MemberId, String)>,
}

struct Room {
    id: RoomId,
    name: String,
    invite_code: InviteCode,
    /// Join order; also the ring order for key exchange.
    members: Vec<MemberId>,
    /// Set once any exchange for this room completes a rotation.
    keyed: bool,
    /// Bumped on every membership change so a stale exchange can't mark
    /// the room keyed.
    generation: u64,
}

impl Room {
    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.id.clone(),
            name: self.name.clone(),
            members: self.members.clone(),
        }
    }
}

#[derive(Default)]
struct State {
    rooms: HashMap<RoomId, Room>,
    invites: HashMap<InviteCode, RoomId>,
    rekeys: HashMap<RoomId, JoinHandle<RekeyOutcome>>,
}

/// Tracks all live rooms.
///
/// `L` is the [`MemberLink`] used to reach members; the server uses a
/// network connection.
pub struct RoomRegistry<L: MemberLink> {
    state: Arc<Mutex<State>>,
    members: Arc<Mutex<MemberRegistry<L>>>,
    exchange: Arc<KeyExchange>,
    config: RegistryConfig,
}

impl<L: MemberLink> RoomRegistry<L> {
    /// Creates an empty registry that resolves members through `members`.
    pub fn new(members: Arc<Mutex<MemberRegistry<L>>>, config: RegistryConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            members,
            exchange: Arc::new(KeyExchange::new(config.exchange.clone())),
            config,
        }
    }

    /// Creates a room with `creator` as its only member and starts a
    /// rekey.
    ///
    /// # Errors
    /// - [`RoomError::InvalidName`] — blank name
    /// - [`RoomError::UnknownMember`] — creator is not connected
    /// - [`RoomError::InviteSpaceExhausted`] — no free invite code found
    pub async fn create_room(
        &self,
        creator: MemberId,
        name: &str,
    ) -> Result<(RoomInfo, InviteCode), RoomError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RoomError::InvalidName);
        }

        let mut state = self.state.lock().await;
        if !self.members.lock().await.contains(creator) {
            return Err(RoomError::UnknownMember(creator));
        }

        let invite_code = self.allocate_invite(&state)?;
        let mut room_id = RoomId::generate();
        while state.rooms.contains_key(&room_id) {
            room_id = RoomId::generate();
        }

        let room = Room {
            id: room_id.clone(),
            name: name.to_string(),
            invite_code: invite_code.clone(),
            members: vec![creator],
            keyed: false,
            generation: 0,
        };
        let info = room.info();
        state.invites.insert(invite_code.clone(), room_id.clone());
        state.rooms.insert(room_id.clone(), room);

        tracing::info!(%room_id, %name, member_id = %creator, "room created");
        self.start_rekey(&mut state, &room_id).await;
        Ok((info, invite_code))
    }

    /// Adds `member` to the room behind `invite_code` and starts a rekey.
    ///
    /// # Errors
    /// - [`RoomError::InvalidInvite`] — no live room has this code; no
    ///   state changes
    /// - [`RoomError::AlreadyInRoom`] — the member is already a member
    /// - [`RoomError::UnknownMember`] — the member is not connected
    pub async fn join_room(
        &self,
        member: MemberId,
        invite_code: &InviteCode,
    ) -> Result<RoomInfo, RoomError> {
        let mut state = self.state.lock().await;
        let room_id = state
            .invites
            .get(invite_code)
            .cloned()
            .ok_or_else(|| RoomError::InvalidInvite(invite_code.clone()))?;

        if !self.members.lock().await.contains(member) {
            return Err(RoomError::UnknownMember(member));
        }

        let room = state
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        if room.members.contains(&member) {
            return Err(RoomError::AlreadyInRoom(member, room_id));
        }
        room.members.push(member);
        let info = room.info();

        tracing::info!(
            %room_id,
            member_id = %member,
            members = info.members.len(),
            "member joined room"
        );
        self.start_rekey(&mut state, &room_id).await;
        Ok(info)
    }

    /// Removes `member` from `room_id`. An emptied room is deleted and
    /// its invite code freed; otherwise the remaining members are rekeyed.
    ///
    /// # Errors
    /// - [`RoomError::NotFound`] — no such room
    /// - [`RoomError::NotInRoom`] — the member is not in it
    pub async fn leave(&self, member: MemberId, room_id: &RoomId) -> Result<(), RoomError> {
        let mut state = self.state.lock().await;
        self.remove_from_room(&mut state, member, room_id).await
    }

    /// Removes `member` from every room it is in. Returns the rooms it
    /// was removed from.
    pub async fn purge_member(&self, member: MemberId) -> Vec<RoomId> {
        let mut state = self.state.lock().await;
        let rooms: Vec<RoomId> = state
            .rooms
            .values()
            .filter(|room| room.members.contains(&member))
            .map(|room| room.id.clone())
            .collect();

        for room_id in &rooms {
            if let Err(e) = self.remove_from_room(&mut state, member, room_id).await {
                tracing::debug!(%room_id, member_id = %member, error = %e, "purge skipped room");
            }
        }
        if !rooms.is_empty() {
            tracing::info!(member_id = %member, rooms = rooms.len(), "member purged from rooms");
        }
        rooms
    }

    /// Delivers `message` to every member of `room_id` at call time,
    /// concurrently. Individual failures are reported, not returned.
    ///
    /// # Errors
    /// Returns [`RoomError::NotFound`] if the room does not exist.
    pub async fn broadcast(
        &self,
        room_id: &RoomId,
        message: ChatPayload,
    ) -> Result<BroadcastReport, RoomError> {
        let (ids, links) = {
            let state = self.state.lock().await;
            let room = state
                .rooms
                .get(room_id)
                .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
            let ids = room.members.clone();
            let links = self.members.lock().await.links(&ids);
            (ids, links)
        };

        let mut report = BroadcastReport::default();
        for id in &ids {
            if !links.iter().any(|(linked, _)| linked == id) {
                report.failed.push((*id, "member not connected".to_string()));
            }
        }

        let deliveries = links.iter().map(|(id, link)| {
            let message = message.clone();
            async move { (*id, link.deliver(message).await) }
        });
        for (id, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered.push(id),
                Err(e) => {
                    tracing::warn!(%room_id, member_id = %id, error = %e, "delivery failed");
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        tracing::debug!(
            %room_id,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "broadcast finished"
        );
        Ok(report)
    }

    /// Relays a chat payload from `sender` to its room.
    ///
    /// The payload's sender is overwritten with `sender`. Plaintext is
    /// refused once the room has been keyed.
    ///
    /// # Errors
    /// - [`RoomError::NotFound`] — no such room
    /// - [`RoomError::NotInRoom`] — `sender` is not a member
    /// - [`RoomError::PlaintextRejected`] — plaintext into a keyed room
    pub async fn post_message(
        &self,
        sender: MemberId,
        mut message: ChatPayload,
    ) -> Result<BroadcastReport, RoomError> {
        let room_id = message.room_id().clone();
        {
            let state = self.state.lock().await;
            let room = state
                .rooms
                .get(&room_id)
                .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
            if !room.members.contains(&sender) {
                return Err(RoomError::NotInRoom(sender, room_id));
            }
            if room.keyed && message.is_plaintext() {
                return Err(RoomError::PlaintextRejected(room_id));
            }
        }

        message.stamp_sender(sender);
        self.broadcast(&room_id, message).await
    }

    /// Returns a summary of the room, if it exists.
    pub async fn room_info(&self, room_id: &RoomId) -> Option<RoomInfo> {
        self.state.lock().await.rooms.get(room_id).map(Room::info)
    }

    /// Returns the room's invite code, if it exists.
    pub async fn invite_code(&self, room_id: &RoomId) -> Option<InviteCode> {
        self.state
            .lock()
            .await
            .rooms
            .get(room_id)
            .map(|room| room.invite_code.clone())
    }

    /// Returns `true` once an exchange has completed for the room.
    pub async fn is_keyed(&self, room_id: &RoomId) -> bool {
        self.state
            .lock()
            .await
            .rooms
            .get(room_id)
            .is_some_and(|room| room.keyed)
    }

    /// Rooms `member` currently belongs to.
    pub async fn rooms_of(&self, member: MemberId) -> Vec<RoomId> {
        self.state
            .lock()
            .await
            .rooms
            .values()
            .filter(|room| room.members.contains(&member))
            .map(|room| room.id.clone())
            .collect()
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.len()
    }

    /// Waits for the room's current rekey to finish and returns its
    /// outcome. Returns `None` if no rekey is tracked or it was
    /// superseded.
    pub async fn await_rekey(&self, room_id: &RoomId) -> Option<RekeyOutcome> {
        let handle = self.state.lock().await.rekeys.remove(room_id)?;
        handle.await.ok()
    }

    /// Aborts every running rekey and waits for them to stop.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.state.lock().await.rekeys.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    // -- internals -------------------------------------------------------

    fn allocate_invite(&self, state: &State) -> Result<InviteCode, RoomError> {
        for _ in 0..self.config.invite_attempts {
            let code = InviteCode::generate();
            if !state.invites.contains_key(&code) {
                return Ok(code);
            }
        }
        Err(RoomError::InviteSpaceExhausted)
    }

    async fn remove_from_room(
        &self,
        state: &mut State,
        member: MemberId,
        room_id: &RoomId,
    ) -> Result<(), RoomError> {
        let room = state
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        let position = room
            .members
            .iter()
            .position(|m| *m == member)
            .ok_or_else(|| RoomError::NotInRoom(member, room_id.clone()))?;
        room.members.remove(position);
        tracing::info!(
            %room_id,
            member_id = %member,
            remaining = room.members.len(),
            "member left room"
        );

        if room.members.is_empty() {
            let invite = room.invite_code.clone();
            state.rooms.remove(room_id);
            state.invites.remove(&invite);
            if let Some(handle) = state.rekeys.remove(room_id) {
                handle.abort();
            }
            tracing::info!(%room_id, "room deleted");
        } else {
            self.start_rekey(state, room_id).await;
        }
        Ok(())
    }

    /// Spawns a rekey for the room's current membership, aborting any
    /// run still in flight for it. Caller holds the room lock.
    async fn start_rekey(&self, state: &mut State, room_id: &RoomId) {
        let Some(room) = state.rooms.get_mut(room_id) else {
            return;
        };
        room.generation += 1;
        let generation = room.generation;
        let links = self.members.lock().await.links(&room.members);

        let task_state = Arc::clone(&self.state);
        let exchange = Arc::clone(&self.exchange);
        let task_room = room_id.clone();
        let handle = tokio::spawn(async move {
            let outcome = exchange.run(&task_room, &links).await;
            if outcome.completed > 0 {
                let mut state = task_state.lock().await;
                match state.rooms.get_mut(&task_room) {
                    Some(room) if room.generation == generation => room.keyed = true,
                    _ => tracing::debug!(room_id = %task_room, "stale rekey finished"),
                }
            }
            outcome
        });

        if let Some(previous) = state.rekeys.insert(room_id.clone(), handle) {
            previous.abort();
            tracing::debug!(%room_id, "superseded running rekey");
        }
    }
}
