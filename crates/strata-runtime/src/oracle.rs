//! Oracle access during block assembly and replay.
//!
//! External data reaches contracts only through an [`OracleReader`]. While a
//! block is assembled a [`BlockOracle`] fetches from an [`OracleBackend`] and
//! records every URL it answered; those entries travel in the block, and
//! validating nodes replay them with [`BlockOracle::from_entries`] so that
//! nothing is fetched twice and every node sees the same bytes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use strata_primitives::{Hash, Serializable, Timestamp};
use strata_types::OracleEntry;
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};

/// Source of external data
pub trait OracleBackend: Send + Sync {
    /// Fetch the content behind `url` as of `time`
    fn fetch(&self, time: Timestamp, url: &str) -> RuntimeResult<Vec<u8>>;
}

/// Oracle as seen by executing contracts
pub trait OracleReader: Send + Sync {
    /// Content behind `url`
    fn read(&self, time: Timestamp, url: &str) -> RuntimeResult<Vec<u8>>;

    /// Raw transaction `hash` of an external `platform` chain
    fn read_transaction(&self, platform: &str, chain: &str, hash: &Hash) -> RuntimeResult<Vec<u8>> {
        self.read(0, &transaction_url(platform, chain, hash))
    }

    /// Entries answered so far, in request order
    fn entries(&self) -> Vec<OracleEntry>;

    /// Forget every entry
    fn clear(&self);
}

impl dyn OracleReader + '_ {
    /// Read and decode a value
    pub fn read_as<T: Serializable>(&self, time: Timestamp, url: &str) -> RuntimeResult<T> {
        Ok(T::from_bytes(&self.read(time, url)?)?)
    }
}

/// URL under which an external transaction is read
pub fn transaction_url(platform: &str, chain: &str, hash: &Hash) -> String {
    format!("interop://{platform}/{chain}/tx/{hash}")
}

/// URL under which a token price is read
pub fn price_url(symbol: &str) -> String {
    format!("price://{symbol}")
}

/// Bounded, recording oracle for one block
pub struct BlockOracle {
    backend: Option<Arc<dyn OracleBackend>>,
    max_entries: usize,
    entries: Mutex<Vec<OracleEntry>>,
}

impl BlockOracle {
    /// Oracle fetching from `backend`, answering at most `max_entries` URLs
    pub fn new(backend: Arc<dyn OracleBackend>, max_entries: usize) -> Self {
        Self {
            backend: Some(backend),
            max_entries,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Oracle replaying the entries recorded in a block; unknown URLs fault
    pub fn from_entries(entries: &[OracleEntry], max_entries: usize) -> Self {
        Self {
            backend: None,
            max_entries,
            entries: Mutex::new(entries.to_vec()),
        }
    }

    /// Oracle that answers nothing
    pub fn empty() -> Self {
        Self {
            backend: None,
            max_entries: 0,
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl OracleReader for BlockOracle {
    fn read(&self, time: Timestamp, url: &str) -> RuntimeResult<Vec<u8>> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter().find(|entry| entry.url == url) {
            return Ok(entry.content.clone());
        }
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| RuntimeError::Oracle(format!("no entry for {url}")))?;
        if entries.len() >= self.max_entries {
            return Err(RuntimeError::OracleLimit);
        }
        let content = backend.fetch(time, url)?;
        debug!(url, bytes = content.len(), "oracle fetch");
        entries.push(OracleEntry::new(url, content.clone()));
        Ok(content)
    }

    fn entries(&self) -> Vec<OracleEntry> {
        self.entries.lock().clone()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// In-memory backend serving fixed content
#[derive(Default)]
pub struct StaticOracle {
    content: RwLock<HashMap<String, Vec<u8>>>,
}

impl StaticOracle {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` under `url`
    pub fn insert(&self, url: impl Into<String>, content: Vec<u8>) {
        self.content.write().insert(url.into(), content);
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(self, url: impl Into<String>, content: Vec<u8>) -> Self {
        self.insert(url, content);
        self
    }
}

impl OracleBackend for StaticOracle {
    fn fetch(&self, _time: Timestamp, url: &str) -> RuntimeResult<Vec<u8>> {
        self.content
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| RuntimeError::Oracle(format!("no content for {url}")))
    }
}
