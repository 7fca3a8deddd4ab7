//! Storage error types

use strata_primitives::CodecError;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// RocksDB error
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Stored bytes did not decode
    #[error("deserialization error: {0}")]
    Codec(#[from] CodecError),

    /// Invalid column family
    #[error("invalid column family: {0}")]
    InvalidColumnFamily(String),

    /// Collection index out of range
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange {
        /// Requested index
        index: u64,
        /// List length
        len: u64,
    },

    /// Invalid data format
    #[error("invalid data format: {0}")]
    InvalidFormat(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
