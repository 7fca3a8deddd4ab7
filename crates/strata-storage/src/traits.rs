//! Key-value access traits

use crate::error::StorageResult;

/// Read access to byte-keyed, byte-valued entries
pub trait StorageReader {
    /// Get a value
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, ordered by key
    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Check if a key is present
    fn has(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Read/write access used by executing code
pub trait StorageContext: StorageReader {
    /// Set a value
    fn put(&mut self, key: &[u8], value: Vec<u8>) -> StorageResult<()>;

    /// Remove a value
    fn delete(&mut self, key: &[u8]) -> StorageResult<()>;
}

/// Shared authoritative store. Writes only land through atomic batches.
pub trait KeyValueStore: StorageReader + Send + Sync {
    /// Apply a batch atomically
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;
}

/// Batch operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Set `key` to `value`
    Put {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Remove `key`
    Delete {
        /// Key
        key: Vec<u8>,
    },
}

/// Ordered list of writes applied as one unit
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    operations: Vec<BatchOp>,
}

impl WriteBatch {
    /// Create a new write batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a put operation
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.operations.push(BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Add a delete operation
    pub fn delete(&mut self, key: &[u8]) {
        self.operations.push(BatchOp::Delete { key: key.to_vec() });
    }

    /// Operations in insertion order
    pub fn operations(&self) -> &[BatchOp] {
        &self.operations
    }

    /// Consume into operations
    pub fn into_operations(self) -> Vec<BatchOp> {
        self.operations
    }

    /// Get number of operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
