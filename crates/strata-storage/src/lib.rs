//! # strata-storage
//!
//! Storage layer for Strata.
//!
//! This crate provides:
//! - The `StorageReader`/`StorageContext` key-value abstraction
//! - Shared authoritative stores (in-memory and RocksDB)
//! - `StorageChangeSet`, a buffered write set merged or discarded atomically
//! - Typed collections (maps, lists, sets) laid out over flat keys

#![warn(missing_docs)]
#![warn(clippy::all)]

mod changeset;
mod collections;
mod db;
mod error;
mod memory;
mod traits;

pub use changeset::StorageChangeSet;
pub use collections::{field_key, StorageList, StorageMap, StorageSet};
pub use db::{DbConfig, RocksStore};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryStore, PrefixedStore};
pub use traits::{BatchOp, KeyValueStore, StorageContext, StorageReader, WriteBatch};
