//! Room ciphers derived from an agreed Diffie-Hellman value.
//!
//! - HKDF-SHA256 turns the 256-byte shared element into a 32-byte key
//! - ChaCha20-Poly1305 seals each message with a fresh random nonce
//!
//! Wire format of `EncryptedChatMessage::ciphertext`:
//! base64( nonce (12 bytes) || ciphertext (includes 16-byte tag) )

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use rand::Rng;
use ringchat_protocol::{ChatMessage, DhValue, EncryptedChatMessage, MemberId, RoomId};
use sha2::{Digest, Sha256};

use crate::CryptoError;
use crate::group::{ELEMENT_LEN, is_valid_element};

/// HKDF info string binding derived keys to this use.
const HKDF_INFO: &[u8] = b"ringchat room key v1";

/// Nonce size for ChaCha20-Poly1305.
const NONCE_SIZE: usize = 12;

/// Poly1305 tag size.
const TAG_SIZE: usize = 16;

/// The symmetric cipher a member installs for a room once rekeying
/// completes. Every member that finished the same exchange derives an
/// identical cipher.
pub struct RoomCipher {
    cipher: ChaCha20Poly1305,
    fingerprint: String,
}

/// Derives the room cipher from the agreed group element.
///
/// The element is encoded as a fixed-width 256-byte big-endian string
/// before key derivation, so leading zero bytes never change the key.
///
/// # Errors
/// - [`CryptoError::InvalidPublicValue`] if `shared` is out of range
/// - [`CryptoError::KeyDerivation`] if HKDF fails
pub fn derive_cipher(shared: &DhValue) -> Result<RoomCipher, CryptoError> {
    if !is_valid_element(shared.as_biguint()) {
        return Err(CryptoError::InvalidPublicValue);
    }

    let bytes = shared.as_biguint().to_bytes_be();
    let mut ikm = [0u8; ELEMENT_LEN];
    ikm[ELEMENT_LEN - bytes.len()..].copy_from_slice(&bytes);

    let hk = Hkdf::<Sha256>::new(None, &ikm);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|_| CryptoError::KeyDerivation)?;

    let digest = Sha256::digest(key);
    let fingerprint = digest[..8].iter().map(|b| format!("{b:02x}")).collect();

    let cipher =
        ChaCha20Poly1305::new_from_slice(&key).map_err(|_| CryptoError::KeyDerivation)?;
    Ok(RoomCipher {
        cipher,
        fingerprint,
    })
}

/// Associated data: the routing fields the server can see but must not
/// be able to change.
fn associated_data(room_id: &RoomId, sender_id: MemberId) -> Vec<u8> {
    let mut aad = Vec::with_capacity(room_id.as_str().len() + 9);
    aad.extend_from_slice(room_id.as_str().as_bytes());
    aad.push(0);
    aad.extend_from_slice(&sender_id.0.to_be_bytes());
    aad
}

impl RoomCipher {
    /// A short identifier of the key, safe to log. Members holding the
    /// same room key report the same fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Seals a chat message.
    pub fn encrypt(&self, message: &ChatMessage) -> Result<EncryptedChatMessage, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let aad = associated_data(&message.room_id, message.sender_id);
        let sealed = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: message.text.as_bytes(),
                    aad: &aad,
                },
            )
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);

        Ok(EncryptedChatMessage {
            room_id: message.room_id.clone(),
            sender_id: message.sender_id,
            ciphertext: BASE64.encode(out),
        })
    }

    /// Opens a sealed chat message.
    ///
    /// # Errors
    /// - [`CryptoError::MalformedCiphertext`] — not base64, or too short
    /// - [`CryptoError::Decryption`] — wrong key, or the ciphertext or
    ///   its routing fields were altered
    pub fn decrypt(&self, message: &EncryptedChatMessage) -> Result<ChatMessage, CryptoError> {
        let data = BASE64
            .decode(&message.ciphertext)
            .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::MalformedCiphertext(format!(
                "{} bytes is shorter than nonce and tag",
                data.len()
            )));
        }

        let (nonce_bytes, sealed) = data.split_at(NONCE_SIZE);
        let aad = associated_data(&message.room_id, message.sender_id);
        let plain = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| CryptoError::Decryption)?;

        let text = String::from_utf8(plain).map_err(|_| CryptoError::Decryption)?;
        Ok(ChatMessage {
            room_id: message.room_id.clone(),
            sender_id: message.sender_id,
            text,
        })
    }
}

impl std::fmt::Debug for RoomCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomCipher")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}
