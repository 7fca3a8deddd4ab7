//! Address derivation

use crate::hash::{keccak256, sha256};
use crate::signature::PublicKey;
use strata_primitives::{Address, AddressKind};

/// Derive the system address of a contract, chain or organization name.
///
/// One-way and deterministic: the same name yields the same address on every
/// node. Callers that resolve names repeatedly should memoize the result.
pub fn address_from_name(name: &str) -> Address {
    Address::from_parts(AddressKind::System, *sha256(name.as_bytes()).as_bytes())
}

/// Derive a user address from a secp256k1 public key
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    // Uncompressed point is 0x04 || x || y; hash x || y
    let encoded = public_key.to_encoded_point(false);
    let digest = keccak256(&encoded.as_bytes()[1..]);
    Address::from_parts(AddressKind::User, *digest.as_bytes())
}

/// Derive the local address standing in for an external platform address
pub fn interop_address(platform: &str, external: &str) -> Address {
    let mut seed = Vec::with_capacity(platform.len() + external.len() + 1);
    seed.extend_from_slice(platform.as_bytes());
    seed.push(b':');
    seed.extend_from_slice(external.as_bytes());
    Address::from_parts(AddressKind::Interop, *sha256(&seed).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn test_name_address_is_deterministic() {
        let a = address_from_name("gas");
        let b = address_from_name("gas");
        assert_eq!(a, b);
        assert!(a.is_system());
        assert_ne!(a, address_from_name("stake"));
    }

    #[test]
    fn test_public_key_address_kind() {
        let key = SigningKey::random(&mut OsRng);
        let address = public_key_to_address(key.verifying_key());
        assert!(address.is_user());
    }

    #[test]
    fn test_interop_address() {
        let a = interop_address("neo", "AQV8");
        assert!(a.is_interop());
        assert_ne!(a, interop_address("eth", "AQV8"));
    }
}
