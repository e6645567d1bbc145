//! Key agreement and message encryption for Ringchat.
//!
//! - [`KeyPair`] — a member's per-room Diffie-Hellman secret and
//!   public value, with [`mix`](KeyPair::mix) for passing a value
//!   along the ring
//! - [`derive_cipher`] / [`RoomCipher`] — HKDF-SHA256 over the agreed
//!   value, then ChaCha20-Poly1305 for chat payloads
//!
//! Nothing in this crate touches the network. The server never holds a
//! [`KeyPair`]; only members do.

pub mod group;

mod cipher;
mod error;
mod keypair;

pub use cipher::{RoomCipher, derive_cipher};
pub use error::CryptoError;
pub use keypair::KeyPair;
