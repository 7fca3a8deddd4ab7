//! ECDSA signature operations using secp256k1

use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};
use std::cmp::Ordering;
use strata_primitives::{BinaryReader, BinaryWriter, CodecError, CodecResult, Hash, Serializable};

/// Half of the secp256k1 curve order (n/2)
const SECP256K1_N_DIV_2: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D,
    0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// Full secp256k1 curve order (n)
const SECP256K1_N: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B,
    0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// Recoverable ECDSA signature
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// r component (32 bytes)
    pub r: [u8; 32],
    /// s component (32 bytes)
    pub s: [u8; 32],
    /// recovery id (0 or 1)
    pub v: u8,
}

/// Public key
pub type PublicKey = VerifyingKey;

/// Private key (32 bytes)
pub type PrivateKey = SigningKey;

impl Signature {
    /// Serialized length
    pub const LEN: usize = 65;

    /// Create signature from r, s, v components
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Signature { r, s, v }
    }

    /// Convert to 65-byte representation (r || s || v)
    pub fn to_array(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Parse from 65-byte representation
    pub fn from_array(bytes: &[u8; 65]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Signature { r, s, v: bytes[64] }
    }

    /// Check if signature has a low-s value
    pub fn is_low_s(&self) -> bool {
        self.s.cmp(&SECP256K1_N_DIV_2) != Ordering::Greater
    }
}

impl Serializable for Signature {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.to_array());
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        let bytes = reader.read_bytes()?;
        let array: [u8; 65] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CodecError::InvalidData(format!("signature length {}", bytes.len())))?;
        Ok(Self::from_array(&array))
    }
}

/// n - s, used to normalize s into the lower half
fn subtract_from_n(s: &[u8; 32]) -> [u8; 32] {
    let mut result = [0u8; 32];
    let mut borrow: u16 = 0;

    for i in (0..32).rev() {
        let diff = (SECP256K1_N[i] as u16)
            .wrapping_sub(s[i] as u16)
            .wrapping_sub(borrow);
        result[i] = diff as u8;
        borrow = if diff > 255 { 1 } else { 0 };
    }

    result
}

/// Sign a message hash with a private key, normalized to low-s
pub fn sign(message_hash: &Hash, private_key: &PrivateKey) -> Result<Signature, CryptoError> {
    let (signature, mut recovery_id) = private_key
        .sign_prehash_recoverable(message_hash.as_bytes())
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    let r_bytes: [u8; 32] = signature.r().to_bytes().into();
    let mut s_bytes: [u8; 32] = signature.s().to_bytes().into();

    if s_bytes.cmp(&SECP256K1_N_DIV_2) == Ordering::Greater {
        s_bytes = subtract_from_n(&s_bytes);
        recovery_id = RecoveryId::try_from(recovery_id.to_byte() ^ 1).map_err(|_| {
            CryptoError::SigningFailed("invalid recovery id after normalization".to_string())
        })?;
    }

    Ok(Signature {
        r: r_bytes,
        s: s_bytes,
        v: recovery_id.to_byte(),
    })
}

/// Verify a signature against a message hash and public key
pub fn verify(
    message_hash: &Hash,
    signature: &Signature,
    public_key: &PublicKey,
) -> Result<bool, CryptoError> {
    if !signature.is_low_s() {
        return Ok(false);
    }

    let r: k256::FieldBytes = signature.r.into();
    let s: k256::FieldBytes = signature.s.into();
    let k256_sig = K256Signature::from_scalars(r, s)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    use k256::ecdsa::signature::hazmat::PrehashVerifier;
    Ok(public_key
        .verify_prehash(message_hash.as_bytes(), &k256_sig)
        .is_ok())
}

/// Recover the signer's public key from a signature and message hash
pub fn recover_public_key(
    message_hash: &Hash,
    signature: &Signature,
) -> Result<PublicKey, CryptoError> {
    let r: k256::FieldBytes = signature.r.into();
    let s: k256::FieldBytes = signature.s.into();
    let k256_sig = K256Signature::from_scalars(r, s)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    let recovery_id =
        RecoveryId::try_from(signature.v).map_err(|_| CryptoError::InvalidRecoveryId(signature.v))?;

    VerifyingKey::recover_from_prehash(message_hash.as_bytes(), &k256_sig, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sha256;
    use rand::rngs::OsRng;

    #[test]
    fn test_sign_and_verify() {
        let private_key = SigningKey::random(&mut OsRng);
        let message_hash = sha256(b"test message");

        let signature = sign(&message_hash, &private_key).unwrap();
        assert!(signature.is_low_s());
        assert!(verify(&message_hash, &signature, private_key.verifying_key()).unwrap());
    }

    #[test]
    fn test_recover_public_key() {
        let private_key = SigningKey::random(&mut OsRng);
        let message_hash = sha256(b"test message");

        let signature = sign(&message_hash, &private_key).unwrap();
        let recovered = recover_public_key(&message_hash, &signature).unwrap();
        assert_eq!(private_key.verifying_key(), &recovered);
    }

    #[test]
    fn test_wrong_message_does_not_verify() {
        let private_key = SigningKey::random(&mut OsRng);
        let signature = sign(&sha256(b"one"), &private_key).unwrap();
        assert!(!verify(&sha256(b"two"), &signature, private_key.verifying_key()).unwrap());
    }

    #[test]
    fn test_reject_high_s_signature() {
        let private_key = SigningKey::random(&mut OsRng);
        let message_hash = sha256(b"test");
        let mut signature = sign(&message_hash, &private_key).unwrap();
        signature.s = [0xFF; 32];
        assert!(!verify(&message_hash, &signature, private_key.verifying_key()).unwrap());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let private_key = SigningKey::random(&mut OsRng);
        let signature = sign(&sha256(b"payload"), &private_key).unwrap();
        let bytes = signature.to_bytes();
        assert_eq!(bytes.len(), 1 + Signature::LEN);
        assert_eq!(Signature::from_bytes(&bytes).unwrap(), signature);
    }
}
