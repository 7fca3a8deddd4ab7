//! SHA-256 and Keccak-256 hashing

use sha2::Sha256;
use sha3::{Digest, Keccak256};
use strata_primitives::Hash;

/// Compute SHA-256 of the input data
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash::from_bytes(hasher.finalize().into())
}

/// Compute SHA-256 over several slices as if they were concatenated
pub fn sha256_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash::from_bytes(hasher.finalize().into())
}

/// Compute Keccak-256 of the input data
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Hash::from_bytes(hasher.finalize().into())
}
