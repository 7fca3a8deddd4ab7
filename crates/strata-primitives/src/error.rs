//! Common error types for primitives

use crate::address::AddressError;
use crate::codec::CodecError;
use crate::hash::HashError;
use thiserror::Error;

/// Primitive operation error
#[derive(Debug, Error)]
pub enum PrimitiveError {
    /// Address error
    #[error("address error: {0}")]
    Address(#[from] AddressError),

    /// Hash error
    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    /// Codec error
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
