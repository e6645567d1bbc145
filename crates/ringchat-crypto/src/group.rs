//! The Diffie-Hellman group every room exchange runs in.
//!
//! 2048-bit MODP group 14 from RFC 3526, generator 2.

use std::sync::LazyLock;

use num_bigint::BigUint;

const PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
    "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
    "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
    "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
    "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
    "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
    "DE2BCBF6955817183995497CEA956AE515D2261898FA0510",
    "15728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

static PRIME: LazyLock<BigUint> = LazyLock::new(|| {
    BigUint::parse_bytes(PRIME_HEX.as_bytes(), 16).unwrap_or_default()
});

static GENERATOR: LazyLock<BigUint> = LazyLock::new(|| BigUint::from(2u32));

/// Width in bytes of a group element when encoded for key derivation.
pub const ELEMENT_LEN: usize = 256;

/// Size in bits of a member's private exponent.
pub const SECRET_BITS: usize = 1024;

/// The group modulus `p`.
pub fn prime() -> &'static BigUint {
    &PRIME
}

/// The group generator `g`.
pub fn generator() -> &'static BigUint {
    &GENERATOR
}

/// Returns `true` if `value` is usable as a peer's public or mixed
/// value: `2 <= value <= p - 2`. The excluded values `0`, `1` and
/// `p - 1` would collapse the shared secret into a tiny subgroup.
pub fn is_valid_element(value: &BigUint) -> bool {
    let two = BigUint::from(2u32);
    *value >= two && *value <= prime() - &two
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prime_is_2048_bits() {
        assert_eq!(prime().bits(), 2048);
    }

    #[test]
    fn test_prime_is_odd() {
        assert!(prime().bit(0));
    }

    #[test]
    fn test_is_valid_element_bounds() {
        let p = prime();
        assert!(!is_valid_element(&BigUint::from(0u32)));
        assert!(!is_valid_element(&BigUint::from(1u32)));
        assert!(is_valid_element(&BigUint::from(2u32)));
        assert!(is_valid_element(&(p - 2u32)));
        assert!(!is_valid_element(&(p - 1u32)));
        assert!(!is_valid_element(p));
    }
}
