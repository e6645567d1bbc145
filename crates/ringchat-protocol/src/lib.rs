//! Wire protocol for Ringchat.
//!
//! This crate defines the "language" that members and the server speak:
//!
//! - **Values** ([`MemberId`], [`RoomId`], [`DhValue`], [`ChatPayload`], …)
//!   the identifiers and payloads that travel on the wire.
//! - **Envelopes** ([`Message`], [`Request`], [`Response`]) the
//!   correlated request/response layer every frame body uses.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) how messages are
//!   converted to/from frame bodies.
//! - **Errors** ([`ProtocolError`]) what can go wrong while decoding.
//!
//! # Architecture
//!
//! The protocol layer sits directly above framing. It doesn't know about
//! sockets or rooms; it only knows how to serialize and deserialize
//! messages.
//!
//! ```text
//! Transport (frames) → Protocol (Message) → Room registry / client
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{
    ErrorCode, Message, Request, RequestKind, RequestPayload, Response, ResponseError,
    ResponsePayload,
};
pub use types::{
    ChatMessage, ChatPayload, DhValue, EncryptedChatMessage, InviteCode, MemberId, RequestId,
    RoomId, RoomInfo,
};
