//! In-memory store and key-prefixed views

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::StorageResult;
use crate::traits::{BatchOp, KeyValueStore, StorageReader, WriteBatch};

/// Ordered in-memory store, used for tests and ephemeral nodes
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StorageReader for MemoryStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read();
        Ok(entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl KeyValueStore for MemoryStore {
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut entries = self.entries.write();
        for op in batch.into_operations() {
            match op {
                BatchOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// View of a shared store with every key under a fixed prefix.
///
/// Each chain of a nexus gets its own prefix so that contract field keys
/// never collide across chains.
#[derive(Clone)]
pub struct PrefixedStore {
    inner: Arc<dyn KeyValueStore>,
    prefix: Vec<u8>,
}

impl PrefixedStore {
    /// Create a view under `prefix`
    pub fn new(inner: Arc<dyn KeyValueStore>, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }
}

impl StorageReader for PrefixedStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(&self.full_key(key))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let skip = self.prefix.len();
        Ok(self
            .inner
            .scan_prefix(&self.full_key(prefix))?
            .into_iter()
            .map(|(k, v)| (k[skip..].to_vec(), v))
            .collect())
    }
}

impl KeyValueStore for PrefixedStore {
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut prefixed = WriteBatch::new();
        for op in batch.into_operations() {
            match op {
                BatchOp::Put { key, value } => prefixed.put(&self.full_key(&key), &value),
                BatchOp::Delete { key } => prefixed.delete(&self.full_key(&key)),
            }
        }
        self.inner.write_batch(prefixed)
    }
}
