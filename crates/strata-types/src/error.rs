//! Errors raised while assembling ledger records

use strata_crypto::CryptoError;
use strata_primitives::CodecError;
use thiserror::Error;

/// Record assembly error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    /// Block was already signed and can no longer change
    #[error("block is sealed")]
    Sealed,

    /// Signing or recovery failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Malformed encoding
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for record operations
pub type TypesResult<T> = Result<T, TypesError>;
