//! # strata-crypto
//!
//! Cryptographic primitives for Strata.
//!
//! - SHA-256 hashing for block, transaction and name digests
//! - Keccak-256 hashing for public key digests
//! - ECDSA signing/verification (secp256k1) with public key recovery
//! - Address derivation from names and public keys

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod error;
mod hash;
mod signature;

pub use address::{address_from_name, interop_address, public_key_to_address};
pub use error::CryptoError;
pub use hash::{keccak256, sha256, sha256_concat};
pub use signature::{recover_public_key, sign, verify, PrivateKey, PublicKey, Signature};
