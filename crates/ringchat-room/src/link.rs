//! How the room layer reaches a member.
//!
//! The key exchange and broadcast never touch sockets directly; they go
//! through [`MemberLink`]. The server uses [`Connection`] as the link,
//! tests use in-memory members.

use std::future::Future;

use ringchat_protocol::{ChatPayload, DhValue, RequestPayload, ResponsePayload, RoomId};
use ringchat_transport::Connection;

use crate::LinkError;

/// Calls the room layer makes on a member.
///
/// # Trait bounds
///
/// - `Clone` → links are cloned out of the member registry so no lock
///   is held while a call is in flight.
/// - `Send + Sync + 'static` → links move into spawned rekey tasks.
pub trait MemberLink: Clone + Send + Sync + 'static {
    /// Asks for the member's public value for `room_id`.
    fn get_public_key(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<DhValue, LinkError>> + Send;

    /// Asks the member to raise `key` to its secret for `room_id`.
    fn get_mixed_key(
        &self,
        room_id: &RoomId,
        key: DhValue,
    ) -> impl Future<Output = Result<DhValue, LinkError>> + Send;

    /// Hands the member the last value of a rotation; the member mixes
    /// it and installs the result as its room key.
    fn post_final_key(
        &self,
        room_id: &RoomId,
        key: DhValue,
    ) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Tells the member to replace its key pair for `room_id`.
    fn regenerate_key_pair(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Delivers a chat payload.
    fn deliver(&self, message: ChatPayload) -> impl Future<Output = Result<(), LinkError>> + Send;
}

fn expect_public_key(payload: ResponsePayload) -> Result<DhValue, LinkError> {
    match payload {
        ResponsePayload::PublicKey { value } => Ok(value),
        other => Err(LinkError::UnexpectedResponse(format!(
            "expected PublicKey, got {other:?}"
        ))),
    }
}

impl MemberLink for Connection {
    async fn get_public_key(&self, room_id: &RoomId) -> Result<DhValue, LinkError> {
        let payload = self
            .request(RequestPayload::GetPublicKey {
                room_id: room_id.clone(),
            })
            .await?;
        expect_public_key(payload)
    }

    async fn get_mixed_key(&self, room_id: &RoomId, key: DhValue) -> Result<DhValue, LinkError> {
        let payload = self
            .request(RequestPayload::GetMixedKey {
                room_id: room_id.clone(),
                key,
            })
            .await?;
        expect_public_key(payload)
    }

    async fn post_final_key(&self, room_id: &RoomId, key: DhValue) -> Result<(), LinkError> {
        self.request(RequestPayload::PostFinalKey {
            room_id: room_id.clone(),
            key,
        })
        .await?;
        Ok(())
    }

    async fn regenerate_key_pair(&self, room_id: &RoomId) -> Result<(), LinkError> {
        self.request(RequestPayload::RegenerateKeyPair {
            room_id: room_id.clone(),
        })
        .await?;
        Ok(())
    }

    async fn deliver(&self, message: ChatPayload) -> Result<(), LinkError> {
        self.request(RequestPayload::DeliverMessage { message }).await?;
        Ok(())
    }
}
