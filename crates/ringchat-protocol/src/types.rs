//! Core value types for Ringchat's wire format.
//!
//! Everything in this module travels "on the wire": identifiers, the
//! Diffie-Hellman values exchanged during rekeying, room summaries, and
//! the chat payloads relayed between members.

use std::fmt;

use num_bigint::BigUint;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of generated request and room identifiers.
const UID_LEN: usize = 10;

/// Length of generated invite codes.
const INVITE_LEN: usize = 6;

/// Characters an invite code is drawn from. Digits `0` and `1` are left
/// out so codes read unambiguously next to `O`, `l` and `I`.
const INVITE_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ23456789";

/// Returns `len` random alphanumeric characters.
fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A server-assigned identifier for a connected member.
///
/// Newtype wrapper over `u64`, serialized as a plain number thanks to
/// `#[serde(transparent)]`. The member registry hands these out from its
/// own counter; nothing else creates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}

/// A unique identifier for a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Generates a fresh random room identifier.
    pub fn generate() -> Self {
        Self(random_alphanumeric(UID_LEN))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// Correlation id pairing a Request with its Response.
///
/// Fresh per outbound request; a Response carries the id of the
/// Request it answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generates a fresh random request identifier.
    pub fn generate() -> Self {
        Self(random_alphanumeric(UID_LEN))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short code a member hands out so others can join their room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteCode(pub String);

impl InviteCode {
    /// Generates a random 6-character invite code.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..INVITE_LEN)
            .map(|_| {
                let idx = rng.random_range(0..INVITE_ALPHABET.len());
                char::from(INVITE_ALPHABET[idx])
            })
            .collect();
        Self(code)
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InviteCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

// ---------------------------------------------------------------------------
// DhValue — a Diffie-Hellman group element
// ---------------------------------------------------------------------------

/// A public or partially-mixed Diffie-Hellman value.
///
/// These are 2048-bit integers, far past what a JSON number can carry
/// without loss, so they travel as lowercase hexadecimal strings:
///
/// ```text
/// { "kind": "GetMixedKey", "room_id": "...", "key": "9f3a..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhValue(pub BigUint);

impl DhValue {
    /// Returns the underlying integer.
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Parses a hexadecimal string. Returns `None` for an empty string
    /// or any non-hex character.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.is_empty() {
            return None;
        }
        BigUint::parse_bytes(hex.as_bytes(), 16).map(Self)
    }

    /// Formats the value as lowercase hexadecimal.
    pub fn to_hex(&self) -> String {
        self.0.to_str_radix(16)
    }
}

impl From<BigUint> for DhValue {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl Serialize for DhValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DhValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex)
            .ok_or_else(|| D::Error::custom("DH value must be a hexadecimal string"))
    }
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// A summary of a room as seen by its members.
///
/// `members` is in join order, which is also the ring order used when
/// the room is rekeyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// The room's unique ID.
    pub room_id: RoomId,
    /// Display name chosen by the creator.
    pub name: String,
    /// Current members, oldest first.
    pub members: Vec<MemberId>,
}

// ---------------------------------------------------------------------------
// Chat payloads
// ---------------------------------------------------------------------------

/// A plaintext chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The room the message belongs to.
    pub room_id: RoomId,
    /// Who wrote it. The server overwrites this with the sending
    /// connection's identity before relaying.
    pub sender_id: MemberId,
    /// The message text.
    pub text: String,
}

/// A chat line sealed with the room cipher.
///
/// `ciphertext` is base64 of `nonce || sealed text`. The room id and
/// sender id are bound to the ciphertext as associated data, so the
/// server can route the message but cannot alter who it claims to be
/// from without breaking decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedChatMessage {
    /// The room the message belongs to.
    pub room_id: RoomId,
    /// Who wrote it (stamped by the server, authenticated by the cipher).
    pub sender_id: MemberId,
    /// Base64-encoded nonce and ciphertext.
    pub ciphertext: String,
}

/// A chat payload as relayed through the server.
///
/// Internally tagged on `type`, so a plaintext message looks like:
///   `{ "type": "ChatMessage", "room_id": "...", "sender_id": 3, "text": "hi" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatPayload {
    /// Plaintext, only accepted for rooms that have not been keyed yet.
    ChatMessage(ChatMessage),
    /// Ciphertext produced by a member's room cipher.
    EncryptedChatMessage(EncryptedChatMessage),
}

impl ChatPayload {
    /// The room this payload is addressed to.
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::ChatMessage(m) => &m.room_id,
            Self::EncryptedChatMessage(m) => &m.room_id,
        }
    }

    /// The claimed sender.
    pub fn sender_id(&self) -> MemberId {
        match self {
            Self::ChatMessage(m) => m.sender_id,
            Self::EncryptedChatMessage(m) => m.sender_id,
        }
    }

    /// Replaces the sender with `sender`.
    pub fn stamp_sender(&mut self, sender: MemberId) {
        match self {
            Self::ChatMessage(m) => m.sender_id = sender,
            Self::EncryptedChatMessage(m) => m.sender_id = sender,
        }
    }

    /// Returns `true` for the plaintext variant.
    pub fn is_plaintext(&self) -> bool {
        matches!(self, Self::ChatMessage(_))
    }
}

// =========================================================================
// Tests
// =========================================================================
