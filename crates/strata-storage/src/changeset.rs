//! Buffered write set over a read-only base

use std::collections::BTreeMap;

use crate::error::StorageResult;
use crate::traits::{BatchOp, StorageContext, StorageReader, WriteBatch};

/// Writes buffered over a base reader.
///
/// Reads fall through to the base unless the key was written or deleted
/// here. Nothing reaches the base until the caller takes the batch with
/// [`into_batch`](Self::into_batch) and applies it; dropping the changeset
/// discards every write. Changesets nest: a transaction changeset can sit
/// over a block changeset, which sits over the chain store.
pub struct StorageChangeSet<'a> {
    base: &'a dyn StorageReader,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> StorageChangeSet<'a> {
    /// Create an empty changeset over `base`
    pub fn new(base: &'a dyn StorageReader) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    /// Number of buffered writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Check if nothing was written
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Drop all buffered writes
    pub fn clear(&mut self) {
        self.writes.clear();
    }

    /// Take the buffered writes as a batch, in key order
    pub fn into_batch(self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for (key, value) in self.writes {
            match value {
                Some(value) => batch.put(&key, &value),
                None => batch.delete(&key),
            }
        }
        batch
    }

    /// Layer a batch taken from a nested changeset on top of this one
    pub fn apply(&mut self, batch: WriteBatch) {
        for op in batch.into_operations() {
            match op {
                BatchOp::Put { key, value } => {
                    self.writes.insert(key, Some(value));
                }
                BatchOp::Delete { key } => {
                    self.writes.insert(key, None);
                }
            }
        }
    }
}

impl StorageReader for StorageChangeSet<'_> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.base.get(key),
        }
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.scan_prefix(prefix)?.into_iter().collect();
        for (key, value) in self
            .writes
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

impl StorageContext for StorageChangeSet<'_> {
    fn put(&mut self, key: &[u8], value: Vec<u8>) -> StorageResult<()> {
        self.writes.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyValueStore, MemoryStore};

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"k.1", b"base1");
        batch.put(b"k.2", b"base2");
        store.write_batch(batch).unwrap();
        store
    }

    #[test]
    fn test_reads_fall_through() {
        let store = seeded_store();
        let mut changes = StorageChangeSet::new(&store);

        assert_eq!(changes.get(b"k.1").unwrap(), Some(b"base1".to_vec()));
        changes.put(b"k.1", b"new".to_vec()).unwrap();
        changes.delete(b"k.2").unwrap();

        assert_eq!(changes.get(b"k.1").unwrap(), Some(b"new".to_vec()));
        assert_eq!(changes.get(b"k.2").unwrap(), None);
        assert_eq!(store.get(b"k.1").unwrap(), Some(b"base1".to_vec()));
    }

    #[test]
    fn test_discard_leaves_base_untouched() {
        let store = seeded_store();
        {
            let mut changes = StorageChangeSet::new(&store);
            changes.put(b"k.3", b"x".to_vec()).unwrap();
        }
        assert_eq!(store.get(b"k.3").unwrap(), None);
    }

    #[test]
    fn test_commit_applies_atomically() {
        let store = seeded_store();
        let mut changes = StorageChangeSet::new(&store);
        changes.put(b"k.3", b"three".to_vec()).unwrap();
        changes.delete(b"k.1").unwrap();
        let batch = changes.into_batch();
        assert_eq!(batch.len(), 2);

        store.write_batch(batch).unwrap();
        assert_eq!(store.get(b"k.1").unwrap(), None);
        assert_eq!(store.get(b"k.3").unwrap(), Some(b"three".to_vec()));
    }

    #[test]
    fn test_nested_changesets() {
        let store = seeded_store();
        let mut block = StorageChangeSet::new(&store);
        block.put(b"k.block", b"b".to_vec()).unwrap();

        let batch = {
            let mut tx = StorageChangeSet::new(&block);
            assert_eq!(tx.get(b"k.block").unwrap(), Some(b"b".to_vec()));
            tx.put(b"k.tx", b"t".to_vec()).unwrap();
            tx.delete(b"k.block").unwrap();
            tx.into_batch()
        };
        block.apply(batch);

        assert_eq!(block.get(b"k.tx").unwrap(), Some(b"t".to_vec()));
        assert_eq!(block.get(b"k.block").unwrap(), None);
        assert_eq!(store.get(b"k.tx").unwrap(), None);
    }

    #[test]
    fn test_scan_prefix_merges_overlay() {
        let store = seeded_store();
        let mut changes = StorageChangeSet::new(&store);
        changes.delete(b"k.1").unwrap();
        changes.put(b"k.0", b"zero".to_vec()).unwrap();
        changes.put(b"j.0", b"unrelated".to_vec()).unwrap();

        assert_eq!(
            changes.scan_prefix(b"k.").unwrap(),
            vec![
                (b"k.0".to_vec(), b"zero".to_vec()),
                (b"k.2".to_vec(), b"base2".to_vec()),
            ]
        );
    }
}
