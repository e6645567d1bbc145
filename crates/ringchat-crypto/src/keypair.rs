//! A member's per-room Diffie-Hellman key pair.

use std::fmt;

use num_bigint::BigUint;
use rand::Rng;
use ringchat_protocol::DhValue;

use crate::CryptoError;
use crate::group::{SECRET_BITS, generator, is_valid_element, prime};

/// A private exponent and its public value `g^secret mod p`.
///
/// The secret never leaves this struct. Only [`public`](Self::public)
/// and the results of [`mix`](Self::mix) are ever sent to the server.
pub struct KeyPair {
    secret: BigUint,
    public: DhValue,
}

impl KeyPair {
    /// Draws a fresh random secret and computes its public value.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut bytes = [0u8; SECRET_BITS / 8];
        let secret = loop {
            rng.fill(&mut bytes[..]);
            let candidate = BigUint::from_bytes_be(&bytes);
            if candidate > BigUint::from(1u32) {
                break candidate;
            }
        };
        let public = DhValue(generator().modpow(&secret, prime()));
        Self { secret, public }
    }

    /// The public value to hand to the first hop of a ring.
    pub fn public(&self) -> &DhValue {
        &self.public
    }

    /// Raises a received value to this pair's secret.
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidPublicValue`] if `value` is not in
    /// `[2, p - 2]`.
    pub fn mix(&self, value: &DhValue) -> Result<DhValue, CryptoError> {
        if !is_valid_element(value.as_biguint()) {
            return Err(CryptoError::InvalidPublicValue);
        }
        Ok(DhValue(value.as_biguint().modpow(&self.secret, prime())))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("secret", &"<redacted>")
            .field("public_bits", &self.public.as_biguint().bits())
            .finish()
    }
}
