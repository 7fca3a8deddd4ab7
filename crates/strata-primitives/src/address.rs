//! Ledger address type (33 bytes: kind tag + 32-byte digest)

use std::fmt;
use thiserror::Error;

/// Address parsing error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Invalid hex string
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Invalid length
    #[error("invalid address length: expected 33 bytes, got {0}")]
    InvalidLength(usize),
    /// Unknown kind tag
    #[error("invalid address kind: {0}")]
    InvalidKind(u8),
}

/// What an address identifies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AddressKind {
    /// The null address
    Null = 0,
    /// Derived from a public key
    User = 1,
    /// Derived from a contract, chain or organization name
    System = 2,
    /// Bound to an external platform
    Interop = 3,
}

impl AddressKind {
    /// Decode a kind tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Null),
            1 => Some(Self::User),
            2 => Some(Self::System),
            3 => Some(Self::Interop),
            _ => None,
        }
    }
}

/// Fixed-size ledger address, immutable once constructed
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 33]);

impl Default for Address {
    fn default() -> Self {
        Self::NULL
    }
}

impl Address {
    /// Size of address in bytes
    pub const LEN: usize = 33;

    /// Null address
    pub const NULL: Address = Address([0u8; 33]);

    /// Build an address from a kind and a digest
    pub const fn from_parts(kind: AddressKind, digest: [u8; 32]) -> Self {
        let mut bytes = [0u8; 33];
        bytes[0] = kind as u8;
        let mut i = 0;
        while i < 32 {
            bytes[i + 1] = digest[i];
            i += 1;
        }
        Address(bytes)
    }

    /// Create address from bytes
    pub fn from_bytes(bytes: [u8; 33]) -> Result<Self, AddressError> {
        AddressKind::from_u8(bytes[0]).ok_or(AddressError::InvalidKind(bytes[0]))?;
        Ok(Address(bytes))
    }

    /// Create address from slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, AddressError> {
        if slice.len() != Self::LEN {
            return Err(AddressError::InvalidLength(slice.len()));
        }
        let mut bytes = [0u8; 33];
        bytes.copy_from_slice(slice);
        Self::from_bytes(bytes)
    }

    /// Parse address from hex string (with or without 0x prefix)
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Get as byte array
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// Kind tag of this address
    pub fn kind(&self) -> AddressKind {
        AddressKind::from_u8(self.0[0]).unwrap_or(AddressKind::Null)
    }

    /// The 32-byte digest part
    pub fn digest(&self) -> [u8; 32] {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&self.0[1..]);
        digest
    }

    /// Check if this is the null address
    pub fn is_null(&self) -> bool {
        self.kind() == AddressKind::Null
    }

    /// Check if this address belongs to a key holder
    pub fn is_user(&self) -> bool {
        self.kind() == AddressKind::User
    }

    /// Check if this address belongs to a contract, chain or organization
    pub fn is_system(&self) -> bool {
        self.kind() == AddressKind::System
    }

    /// Check if this address is bound to an external platform
    pub fn is_interop(&self) -> bool {
        self.kind() == AddressKind::Interop
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for Address {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.to_hex())
        }
    }

    impl<'de> Deserialize<'de> for Address {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            Address::from_hex(&s).map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_address() {
        let null = Address::NULL;
        assert!(null.is_null());
        assert_eq!(null.kind(), AddressKind::Null);
        assert_eq!(Address::default(), null);
    }

    #[test]
    fn test_from_parts() {
        let addr = Address::from_parts(AddressKind::User, [0xab; 32]);
        assert!(addr.is_user());
        assert!(!addr.is_system());
        assert_eq!(addr.digest(), [0xab; 32]);
        assert_eq!(addr.as_bytes()[0], 1);
    }

    #[test]
    fn test_hex_roundtrip() {
        let addr = Address::from_parts(AddressKind::System, [0x11; 32]);
        let hex = addr.to_hex();
        assert!(hex.starts_with("0x02"));
        assert_eq!(Address::from_hex(&hex).unwrap(), addr);
        assert_eq!(hex.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_invalid_length() {
        assert_eq!(
            Address::from_slice(&[1u8; 20]),
            Err(AddressError::InvalidLength(20))
        );
    }

    #[test]
    fn test_invalid_kind() {
        let mut bytes = [0u8; 33];
        bytes[0] = 9;
        assert_eq!(Address::from_bytes(bytes), Err(AddressError::InvalidKind(9)));
    }

    #[test]
    fn test_invalid_hex() {
        assert!(matches!(
            Address::from_hex("0xzz"),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_ordering_follows_bytes() {
        let a = Address::from_parts(AddressKind::User, [1; 32]);
        let b = Address::from_parts(AddressKind::User, [2; 32]);
        let c = Address::from_parts(AddressKind::System, [0; 32]);
        assert!(a < b);
        assert!(b < c);
    }
}
