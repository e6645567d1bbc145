//! Integration tests for rooms and ring key exchange using in-memory
//! members.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ringchat_crypto::KeyPair;
use ringchat_protocol::{
    ChatMessage, ChatPayload, DhValue, EncryptedChatMessage, InviteCode, MemberId, RoomId,
};
use ringchat_room::{
    ExchangeConfig, KeyExchange, LinkError, MemberLink, RegistryConfig, RoomError, RoomRegistry,
};
use ringchat_session::{MemberConfig, MemberRegistry};
use ringchat_transport::TransportError;

// =========================================================================
// Fake member: holds real key pairs, no network.
// =========================================================================

fn refused(call: &str) -> LinkError {
    LinkError::Transport(TransportError::ConnectionClosed(format!("{call} refused")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailMode {
    None,
    /// Refuse every `post_final_key`.
    FailFinal,
    /// Refuse every call.
    FailAll,
}

#[derive(Default)]
struct FakeState {
    keys: HashMap<RoomId, KeyPair>,
    installed: HashMap<RoomId, Vec<DhValue>>,
    delivered: Vec<ChatPayload>,
}

#[derive(Clone)]
struct FakeMember {
    state: Arc<Mutex<FakeState>>,
    regenerations: Arc<AtomicUsize>,
    fail: FailMode,
}

impl FakeMember {
    fn new() -> Self {
        Self::with_mode(FailMode::None)
    }

    fn with_mode(fail: FailMode) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            regenerations: Arc::new(AtomicUsize::new(0)),
            fail,
        }
    }

    fn check(&self, call: &str) -> Result<(), LinkError> {
        if self.fail == FailMode::FailAll {
            return Err(refused(call));
        }
        Ok(())
    }

    fn with_key<T>(&self, room_id: &RoomId, f: impl FnOnce(&KeyPair) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        let pair = state
            .keys
            .entry(room_id.clone())
            .or_insert_with(KeyPair::generate);
        f(pair)
    }

    fn installed(&self, room_id: &RoomId) -> Vec<DhValue> {
        self.state
            .lock()
            .unwrap()
            .installed
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    fn last_key(&self, room_id: &RoomId) -> Option<DhValue> {
        self.installed(room_id).last().cloned()
    }

    fn delivered(&self) -> Vec<ChatPayload> {
        self.state.lock().unwrap().delivered.clone()
    }

    fn regenerations(&self) -> usize {
        self.regenerations.load(Ordering::SeqCst)
    }
}

impl MemberLink for FakeMember {
    async fn get_public_key(&self, room_id: &RoomId) -> Result<DhValue, LinkError> {
        self.check("get_public_key")?;
        Ok(self.with_key(room_id, |pair| pair.public().clone()))
    }

    async fn get_mixed_key(&self, room_id: &RoomId, key: DhValue) -> Result<DhValue, LinkError> {
        self.check("get_mixed_key")?;
        self.with_key(room_id, |pair| pair.mix(&key))
            .map_err(|e| LinkError::UnexpectedResponse(e.to_string()))
    }

    async fn post_final_key(&self, room_id: &RoomId, key: DhValue) -> Result<(), LinkError> {
        self.check("post_final_key")?;
        if self.fail == FailMode::FailFinal {
            return Err(refused("post_final_key"));
        }
        let shared = self
            .with_key(room_id, |pair| pair.mix(&key))
            .map_err(|e| LinkError::UnexpectedResponse(e.to_string()))?;
        self.state
            .lock()
            .unwrap()
            .installed
            .entry(room_id.clone())
            .or_default()
            .push(shared);
        Ok(())
    }

    async fn regenerate_key_pair(&self, room_id: &RoomId) -> Result<(), LinkError> {
        self.check("regenerate_key_pair")?;
        self.regenerations.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .keys
            .insert(room_id.clone(), KeyPair::generate());
        Ok(())
    }

    async fn deliver(&self, message: ChatPayload) -> Result<(), LinkError> {
        self.check("deliver")?;
        self.state.lock().unwrap().delivered.push(message);
        Ok(())
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn room() -> RoomId {
    RoomId("test-room".into())
}

fn ring(members: &[FakeMember]) -> Vec<(MemberId, FakeMember)> {
    members
        .iter()
        .enumerate()
        .map(|(i, m)| (MemberId(i as u64 + 1), m.clone()))
        .collect()
}

async fn registry_with(
    members: &[FakeMember],
) -> (RoomRegistry<FakeMember>, Vec<MemberId>) {
    let mut sessions = MemberRegistry::new(MemberConfig::default());
    let ids = members
        .iter()
        .map(|m| sessions.register(m.clone()).unwrap())
        .collect();
    let registry = RoomRegistry::new(
        Arc::new(tokio::sync::Mutex::new(sessions)),
        RegistryConfig::default(),
    );
    (registry, ids)
}

fn plaintext(room_id: &RoomId, text: &str) -> ChatPayload {
    ChatPayload::ChatMessage(ChatMessage {
        room_id: room_id.clone(),
        sender_id: MemberId(999),
        text: text.into(),
    })
}

fn sealed(room_id: &RoomId) -> ChatPayload {
    ChatPayload::EncryptedChatMessage(EncryptedChatMessage {
        room_id: room_id.clone(),
        sender_id: MemberId(999),
        ciphertext: "AAAA".into(),
    })
}

// =========================================================================
// Key exchange
// =========================================================================

async fn assert_ring_agrees(n: usize) {
    let members: Vec<FakeMember> = (0..n).map(|_| FakeMember::new()).collect();
    let outcome = KeyExchange::default().run(&room(), &ring(&members)).await;

    assert_eq!(outcome.members, n);
    assert!(outcome.is_complete(), "outcome: {outcome:?}");

    let keys: Vec<DhValue> = members
        .iter()
        .map(|m| {
            let installed = m.installed(&room());
            assert_eq!(installed.len(), 1, "each member is terminus exactly once");
            installed[0].clone()
        })
        .collect();
    assert!(keys.windows(2).all(|w| w[0] == w[1]), "ring of {n} disagreed");
}

#[tokio::test]
async fn test_exchange_single_member_installs_key() {
    assert_ring_agrees(1).await;
}

#[tokio::test]
async fn test_exchange_two_members_agree() {
    assert_ring_agrees(2).await;
}

#[tokio::test]
async fn test_exchange_three_members_agree() {
    assert_ring_agrees(3).await;
}

#[tokio::test]
async fn test_exchange_four_members_agree() {
    assert_ring_agrees(4).await;
}

#[tokio::test]
async fn test_exchange_empty_ring_is_noop() {
    let outcome = KeyExchange::default()
        .run::<FakeMember>(&room(), &[])
        .await;
    assert_eq!(outcome.members, 0);
    assert_eq!(outcome.completed, 0);
}

#[tokio::test]
async fn test_exchange_regenerates_exactly_one_member() {
    let members: Vec<FakeMember> = (0..3).map(|_| FakeMember::new()).collect();
    KeyExchange::default().run(&room(), &ring(&members)).await;

    let total: usize = members.iter().map(FakeMember::regenerations).sum();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_exchange_without_regeneration() {
    let members: Vec<FakeMember> = (0..2).map(|_| FakeMember::new()).collect();
    let exchange = KeyExchange::new(ExchangeConfig {
        regenerate_before_rekey: false,
    });
    exchange.run(&room(), &ring(&members)).await;

    assert!(members.iter().all(|m| m.regenerations() == 0));
}

#[tokio::test]
async fn test_exchange_rekey_changes_key() {
    let members: Vec<FakeMember> = (0..2).map(|_| FakeMember::new()).collect();
    let exchange = KeyExchange::default();

    exchange.run(&room(), &ring(&members)).await;
    let first = members[0].last_key(&room()).unwrap();
    exchange.run(&room(), &ring(&members)).await;
    let second = members[0].last_key(&room()).unwrap();

    assert_ne!(first, second);
    assert_eq!(members[1].last_key(&room()).unwrap(), second);
}

#[tokio::test]
async fn test_exchange_failed_final_isolated_to_one_rotation() {
    let members = vec![
        FakeMember::new(),
        FakeMember::with_mode(FailMode::FailFinal),
        FakeMember::new(),
    ];
    let outcome = KeyExchange::default().run(&room(), &ring(&members)).await;

    assert_eq!(outcome.completed, 2);
    assert_eq!(outcome.failed, 1);
    assert!(!outcome.is_complete());
    assert!(members[1].installed(&room()).is_empty());
    assert_eq!(members[0].last_key(&room()), members[2].last_key(&room()));
}

#[tokio::test]
async fn test_exchange_unreachable_member_fails_every_rotation() {
    let members = vec![
        FakeMember::new(),
        FakeMember::with_mode(FailMode::FailAll),
    ];
    let outcome = KeyExchange::default().run(&room(), &ring(&members)).await;

    assert_eq!(outcome.completed, 0);
    assert_eq!(outcome.failed, 2);
}

// =========================================================================
// Registry: create / join / leave
// =========================================================================

#[tokio::test]
async fn test_create_room_keys_creator() {
    let members = vec![FakeMember::new()];
    let (registry, ids) = registry_with(&members).await;

    let (info, invite) = registry.create_room(ids[0], "  lobby ").await.unwrap();
    assert_eq!(info.name, "lobby");
    assert_eq!(info.members, vec![ids[0]]);
    assert_eq!(invite.as_str().len(), 6);
    assert_eq!(registry.invite_code(&info.room_id).await, Some(invite));

    let outcome = registry.await_rekey(&info.room_id).await.unwrap();
    assert!(outcome.is_complete());
    assert!(registry.is_keyed(&info.room_id).await);
    assert_eq!(members[0].installed(&info.room_id).len(), 1);
}

#[tokio::test]
async fn test_create_room_rejects_blank_name() {
    let members = vec![FakeMember::new()];
    let (registry, ids) = registry_with(&members).await;

    let err = registry.create_room(ids[0], "   ").await.unwrap_err();
    assert!(matches!(err, RoomError::InvalidName));
    assert_eq!(registry.room_count().await, 0);
}

#[tokio::test]
async fn test_create_room_rejects_unknown_member() {
    let (registry, _) = registry_with(&[]).await;

    let err = registry.create_room(MemberId(42), "lobby").await.unwrap_err();
    assert!(matches!(err, RoomError::UnknownMember(MemberId(42))));
}

#[tokio::test]
async fn test_join_room_appends_in_order_and_rekeys() {
    let members: Vec<FakeMember> = (0..3).map(|_| FakeMember::new()).collect();
    let (registry, ids) = registry_with(&members).await;

    let (info, invite) = registry.create_room(ids[0], "lobby").await.unwrap();
    registry.await_rekey(&info.room_id).await;
    registry.join_room(ids[1], &invite).await.unwrap();
    registry.await_rekey(&info.room_id).await;
    let joined = registry.join_room(ids[2], &invite).await.unwrap();
    registry.await_rekey(&info.room_id).await.unwrap();

    assert_eq!(joined.members, ids);
    let key = members[0].last_key(&info.room_id).unwrap();
    assert!(members.iter().all(|m| m.last_key(&info.room_id) == Some(key.clone())));
}

#[tokio::test]
async fn test_join_room_invalid_invite_changes_nothing() {
    let members: Vec<FakeMember> = (0..2).map(|_| FakeMember::new()).collect();
    let (registry, ids) = registry_with(&members).await;
    let (info, _) = registry.create_room(ids[0], "lobby").await.unwrap();
    registry.await_rekey(&info.room_id).await;

    let err = registry
        .join_room(ids[1], &InviteCode::from("ABC123"))
        .await
        .unwrap_err();

    assert!(matches!(err, RoomError::InvalidInvite(_)));
    assert_eq!(registry.room_info(&info.room_id).await.unwrap().members, vec![ids[0]]);
    assert!(registry.rooms_of(ids[1]).await.is_empty());
    assert!(members[1].installed(&info.room_id).is_empty());
}

#[tokio::test]
async fn test_join_room_twice_is_rejected() {
    let members = vec![FakeMember::new()];
    let (registry, ids) = registry_with(&members).await;
    let (_, invite) = registry.create_room(ids[0], "lobby").await.unwrap();

    let err = registry.join_room(ids[0], &invite).await.unwrap_err();
    assert!(matches!(err, RoomError::AlreadyInRoom(..)));
}

#[tokio::test]
async fn test_leave_last_member_deletes_room_and_frees_invite() {
    let members: Vec<FakeMember> = (0..2).map(|_| FakeMember::new()).collect();
    let (registry, ids) = registry_with(&members).await;
    let (info, invite) = registry.create_room(ids[0], "lobby").await.unwrap();

    registry.leave(ids[0], &info.room_id).await.unwrap();

    assert_eq!(registry.room_count().await, 0);
    assert!(registry.room_info(&info.room_id).await.is_none());
    let err = registry.join_room(ids[1], &invite).await.unwrap_err();
    assert!(matches!(err, RoomError::InvalidInvite(_)));
}

#[tokio::test]
async fn test_leave_rekeys_remaining_members() {
    let members: Vec<FakeMember> = (0..3).map(|_| FakeMember::new()).collect();
    let (registry, ids) = registry_with(&members).await;
    let (info, invite) = registry.create_room(ids[0], "lobby").await.unwrap();
    registry.join_room(ids[1], &invite).await.unwrap();
    registry.join_room(ids[2], &invite).await.unwrap();
    registry.await_rekey(&info.room_id).await;
    let before = members[2].last_key(&info.room_id).unwrap();

    registry.leave(ids[1], &info.room_id).await.unwrap();
    registry.await_rekey(&info.room_id).await.unwrap();

    let after = members[0].last_key(&info.room_id).unwrap();
    assert_ne!(before, after);
    assert_eq!(members[2].last_key(&info.room_id), Some(after));
    assert_eq!(
        registry.room_info(&info.room_id).await.unwrap().members,
        vec![ids[0], ids[2]]
    );
}

#[tokio::test]
async fn test_leave_not_in_room() {
    let members: Vec<FakeMember> = (0..2).map(|_| FakeMember::new()).collect();
    let (registry, ids) = registry_with(&members).await;
    let (info, _) = registry.create_room(ids[0], "lobby").await.unwrap();

    let err = registry.leave(ids[1], &info.room_id).await.unwrap_err();
    assert!(matches!(err, RoomError::NotInRoom(..)));
    let err = registry.leave(ids[0], &room()).await.unwrap_err();
    assert!(matches!(err, RoomError::NotFound(_)));
}

#[tokio::test]
async fn test_purge_member_leaves_every_room() {
    let members: Vec<FakeMember> = (0..2).map(|_| FakeMember::new()).collect();
    let (registry, ids) = registry_with(&members).await;
    let (shared, invite) = registry.create_room(ids[0], "shared").await.unwrap();
    registry.join_room(ids[1], &invite).await.unwrap();
    let (solo, _) = registry.create_room(ids[1], "solo").await.unwrap();

    let mut left = registry.purge_member(ids[1]).await;
    left.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    let mut expected = vec![shared.room_id.clone(), solo.room_id.clone()];
    expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));

    assert_eq!(left, expected);
    assert!(registry.room_info(&solo.room_id).await.is_none());
    assert_eq!(
        registry.room_info(&shared.room_id).await.unwrap().members,
        vec![ids[0]]
    );
    registry.shutdown().await;
}

// =========================================================================
// Registry: messages
// =========================================================================

#[tokio::test]
async fn test_post_message_stamps_sender_and_reaches_everyone() {
    let members: Vec<FakeMember> = (0..3).map(|_| FakeMember::new()).collect();
    let (registry, ids) = registry_with(&members).await;
    let (info, invite) = registry.create_room(ids[0], "lobby").await.unwrap();
    registry.join_room(ids[1], &invite).await.unwrap();
    registry.join_room(ids[2], &invite).await.unwrap();
    registry.await_rekey(&info.room_id).await;

    let report = registry
        .post_message(ids[1], sealed(&info.room_id))
        .await
        .unwrap();

    assert_eq!(report.delivered.len(), 3);
    assert!(report.failed.is_empty());
    for member in &members {
        let delivered = member.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].sender_id(), ids[1]);
    }
}

#[tokio::test]
async fn test_post_message_plaintext_rejected_once_keyed() {
    let members = vec![FakeMember::new()];
    let (registry, ids) = registry_with(&members).await;
    let (info, _) = registry.create_room(ids[0], "lobby").await.unwrap();
    registry.await_rekey(&info.room_id).await;

    let err = registry
        .post_message(ids[0], plaintext(&info.room_id, "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::PlaintextRejected(_)));
    assert!(members[0].delivered().is_empty());
}

#[tokio::test]
async fn test_post_message_requires_membership() {
    let members: Vec<FakeMember> = (0..2).map(|_| FakeMember::new()).collect();
    let (registry, ids) = registry_with(&members).await;
    let (info, _) = registry.create_room(ids[0], "lobby").await.unwrap();

    let err = registry
        .post_message(ids[1], sealed(&info.room_id))
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::NotInRoom(..)));
}

#[tokio::test]
async fn test_broadcast_reports_failing_member() {
    let members = vec![
        FakeMember::new(),
        FakeMember::with_mode(FailMode::FailAll),
        FakeMember::new(),
    ];
    let (registry, ids) = registry_with(&members).await;
    let (info, invite) = registry.create_room(ids[0], "lobby").await.unwrap();
    registry.join_room(ids[1], &invite).await.unwrap();
    registry.join_room(ids[2], &invite).await.unwrap();

    let report = registry
        .broadcast(&info.room_id, sealed(&info.room_id))
        .await
        .unwrap();

    assert_eq!(report.delivered, vec![ids[0], ids[2]]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, ids[1]);
    assert_eq!(members[0].delivered().len(), 1);
    assert_eq!(members[2].delivered().len(), 1);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_broadcast_unknown_room() {
    let (registry, _) = registry_with(&[]).await;
    let err = registry.broadcast(&room(), sealed(&room())).await.unwrap_err();
    assert!(matches!(err, RoomError::NotFound(_)));
}
