/// Errors that can occur in key agreement and message encryption.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A received DH value lies outside `[2, p - 2]`.
    #[error("DH value is outside the valid range of the group")]
    InvalidPublicValue,

    /// HKDF could not produce the requested key length.
    #[error("key derivation failed")]
    KeyDerivation,

    /// Sealing a message failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The ciphertext did not authenticate under this key. Either it was
    /// sealed with a different room key or it was modified in transit.
    #[error("decryption failed")]
    Decryption,

    /// The ciphertext field is not valid base64 or is too short to hold
    /// a nonce and tag.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),
}
