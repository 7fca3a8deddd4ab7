//! # strata-primitives
//!
//! Primitive types for the Strata ledger.
//!
//! This crate provides the fundamental identifiers used throughout the system
//! and the deterministic binary codec every consensus-visible record is
//! serialized with.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod codec;
mod error;
mod hash;

pub use address::{Address, AddressError, AddressKind};
pub use codec::{BinaryReader, BinaryWriter, CodecError, CodecResult, Serializable};
pub use error::PrimitiveError;
pub use hash::{Hash, HashError};

/// Block height type
pub type BlockHeight = u64;

/// Unix timestamp in seconds, as carried by blocks and transactions
pub type Timestamp = u32;
