//! Typed collections laid out over flat storage keys.
//!
//! A collection is just a key prefix; the handle holds no data and every
//! call reads and writes through the storage it is given. Entries live under
//! `prefix ++ "<" ++ key` and the element count under `prefix ++ "{count}"`.

use strata_primitives::Serializable;

use crate::error::{StorageError, StorageResult};
use crate::traits::{StorageContext, StorageReader};

const ENTRY_MARK: u8 = b'<';
const COUNT_SUFFIX: &[u8] = b"{count}";

/// Storage key of a contract field: `.{contract}.{field}`
pub fn field_key(contract: &str, field: &str) -> Vec<u8> {
    format!(".{contract}.{field}").into_bytes()
}

fn read_count<S: StorageReader + ?Sized>(storage: &S, key: &[u8]) -> StorageResult<u64> {
    match storage.get(key)? {
        Some(bytes) => {
            let array: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| StorageError::InvalidFormat(format!("count of {} bytes", bytes.len())))?;
            Ok(u64::from_le_bytes(array))
        }
        None => Ok(0),
    }
}

fn write_count<S: StorageContext + ?Sized>(storage: &mut S, key: &[u8], count: u64) -> StorageResult<()> {
    if count == 0 {
        storage.delete(key)
    } else {
        storage.put(key, count.to_le_bytes().to_vec())
    }
}

/// Key/value map with a maintained entry count
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageMap {
    prefix: Vec<u8>,
}

impl StorageMap {
    /// Map rooted at `prefix`
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Map stored in a contract field
    pub fn field(contract: &str, field: &str) -> Self {
        Self::new(field_key(contract, field))
    }

    fn entries_prefix(&self) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.push(ENTRY_MARK);
        key
    }

    fn entry_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = self.entries_prefix();
        full.extend_from_slice(key);
        full
    }

    fn count_key(&self) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(COUNT_SUFFIX);
        key
    }

    /// Raw value under `key`
    pub fn get<S: StorageReader + ?Sized>(&self, storage: &S, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        storage.get(&self.entry_key(key))
    }

    /// Decoded value under `key`
    pub fn get_value<T: Serializable, S: StorageReader + ?Sized>(
        &self,
        storage: &S,
        key: &[u8],
    ) -> StorageResult<Option<T>> {
        match self.get(storage, key)? {
            Some(bytes) => Ok(Some(T::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether `key` is present
    pub fn contains<S: StorageReader + ?Sized>(&self, storage: &S, key: &[u8]) -> StorageResult<bool> {
        storage.has(&self.entry_key(key))
    }

    /// Number of entries
    pub fn count<S: StorageReader + ?Sized>(&self, storage: &S) -> StorageResult<u64> {
        read_count(storage, &self.count_key())
    }

    /// Insert or replace a raw value
    pub fn set<S: StorageContext + ?Sized>(&self, storage: &mut S, key: &[u8], value: Vec<u8>) -> StorageResult<()> {
        let entry = self.entry_key(key);
        if !storage.has(&entry)? {
            let count = self.count(storage)?;
            write_count(storage, &self.count_key(), count + 1)?;
        }
        storage.put(&entry, value)
    }

    /// Insert or replace an encoded value
    pub fn set_value<T: Serializable, S: StorageContext + ?Sized>(
        &self,
        storage: &mut S,
        key: &[u8],
        value: &T,
    ) -> StorageResult<()> {
        self.set(storage, key, value.to_bytes())
    }

    /// Remove `key`; returns whether it was present
    pub fn remove<S: StorageContext + ?Sized>(&self, storage: &mut S, key: &[u8]) -> StorageResult<bool> {
        let entry = self.entry_key(key);
        if !storage.has(&entry)? {
            return Ok(false);
        }
        let count = self.count(storage)?;
        write_count(storage, &self.count_key(), count.saturating_sub(1))?;
        storage.delete(&entry)?;
        Ok(true)
    }

    /// All entries, ordered by key
    pub fn entries<S: StorageReader + ?Sized>(&self, storage: &S) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let prefix = self.entries_prefix();
        Ok(storage
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|(k, v)| (k[prefix.len()..].to_vec(), v))
            .collect())
    }

    /// All keys, ordered
    pub fn keys<S: StorageReader + ?Sized>(&self, storage: &S) -> StorageResult<Vec<Vec<u8>>> {
        Ok(self.entries(storage)?.into_iter().map(|(k, _)| k).collect())
    }

    /// Remove every entry
    pub fn clear<S: StorageContext + ?Sized>(&self, storage: &mut S) -> StorageResult<()> {
        for key in self.keys(storage)? {
            storage.delete(&self.entry_key(&key))?;
        }
        write_count(storage, &self.count_key(), 0)
    }
}

/// Ordered list addressed by index
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageList {
    prefix: Vec<u8>,
}

impl StorageList {
    /// List rooted at `prefix`
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// List stored in a contract field
    pub fn field(contract: &str, field: &str) -> Self {
        Self::new(field_key(contract, field))
    }

    fn index_key(&self, index: u64) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.push(ENTRY_MARK);
        key.extend_from_slice(&index.to_be_bytes());
        key
    }

    fn count_key(&self) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(COUNT_SUFFIX);
        key
    }

    /// Number of elements
    pub fn len<S: StorageReader + ?Sized>(&self, storage: &S) -> StorageResult<u64> {
        read_count(storage, &self.count_key())
    }

    /// Check if the list is empty
    pub fn is_empty<S: StorageReader + ?Sized>(&self, storage: &S) -> StorageResult<bool> {
        Ok(self.len(storage)? == 0)
    }

    /// Element at `index`
    pub fn get<S: StorageReader + ?Sized>(&self, storage: &S, index: u64) -> StorageResult<Vec<u8>> {
        let len = self.len(storage)?;
        if index >= len {
            return Err(StorageError::IndexOutOfRange { index, len });
        }
        storage
            .get(&self.index_key(index))?
            .ok_or_else(|| StorageError::InvalidFormat(format!("missing list element {index}")))
    }

    /// Decoded element at `index`
    pub fn get_value<T: Serializable, S: StorageReader + ?Sized>(&self, storage: &S, index: u64) -> StorageResult<T> {
        Ok(T::from_bytes(&self.get(storage, index)?)?)
    }

    /// Append an element; returns its index
    pub fn push<S: StorageContext + ?Sized>(&self, storage: &mut S, value: Vec<u8>) -> StorageResult<u64> {
        let len = self.len(storage)?;
        storage.put(&self.index_key(len), value)?;
        write_count(storage, &self.count_key(), len + 1)?;
        Ok(len)
    }

    /// Replace the element at `index`
    pub fn replace<S: StorageContext + ?Sized>(&self, storage: &mut S, index: u64, value: Vec<u8>) -> StorageResult<()> {
        let len = self.len(storage)?;
        if index >= len {
            return Err(StorageError::IndexOutOfRange { index, len });
        }
        storage.put(&self.index_key(index), value)
    }

    /// Remove the element at `index`, shifting later elements down
    pub fn remove_at<S: StorageContext + ?Sized>(&self, storage: &mut S, index: u64) -> StorageResult<Vec<u8>> {
        let removed = self.get(storage, index)?;
        let len = self.len(storage)?;
        for i in index + 1..len {
            let value = self.get(storage, i)?;
            storage.put(&self.index_key(i - 1), value)?;
        }
        storage.delete(&self.index_key(len - 1))?;
        write_count(storage, &self.count_key(), len - 1)?;
        Ok(removed)
    }

    /// All elements in order
    pub fn all<S: StorageReader + ?Sized>(&self, storage: &S) -> StorageResult<Vec<Vec<u8>>> {
        (0..self.len(storage)?).map(|i| self.get(storage, i)).collect()
    }

    /// Remove every element
    pub fn clear<S: StorageContext + ?Sized>(&self, storage: &mut S) -> StorageResult<()> {
        let len = self.len(storage)?;
        for i in 0..len {
            storage.delete(&self.index_key(i))?;
        }
        write_count(storage, &self.count_key(), 0)
    }
}

/// Set of byte strings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageSet {
    map: StorageMap,
}

impl StorageSet {
    /// Set rooted at `prefix`
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            map: StorageMap::new(prefix),
        }
    }

    /// Set stored in a contract field
    pub fn field(contract: &str, field: &str) -> Self {
        Self::new(field_key(contract, field))
    }

    /// Add a member; returns false if already present
    pub fn add<S: StorageContext + ?Sized>(&self, storage: &mut S, item: &[u8]) -> StorageResult<bool> {
        if self.map.contains(storage, item)? {
            return Ok(false);
        }
        self.map.set(storage, item, Vec::new())?;
        Ok(true)
    }

    /// Remove a member; returns whether it was present
    pub fn remove<S: StorageContext + ?Sized>(&self, storage: &mut S, item: &[u8]) -> StorageResult<bool> {
        self.map.remove(storage, item)
    }

    /// Whether `item` is a member
    pub fn contains<S: StorageReader + ?Sized>(&self, storage: &S, item: &[u8]) -> StorageResult<bool> {
        self.map.contains(storage, item)
    }

    /// Number of members
    pub fn count<S: StorageReader + ?Sized>(&self, storage: &S) -> StorageResult<u64> {
        self.map.count(storage)
    }

    /// All members, ordered
    pub fn items<S: StorageReader + ?Sized>(&self, storage: &S) -> StorageResult<Vec<Vec<u8>>> {
        self.map.keys(storage)
    }
}
