//! RocksDB-backed store

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch as RocksBatch,
};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::traits::{BatchOp, KeyValueStore, StorageReader, WriteBatch};

/// Column family names
pub mod cf {
    /// Chain and registry state
    pub const STATE: &str = "state";
}

/// All column family names
pub const ALL_CFS: &[&str] = &[cf::STATE];

type RocksDB = DBWithThreadMode<MultiThreaded>;

/// Database configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// Create database if missing
    pub create_if_missing: bool,
    /// Maximum number of open files
    pub max_open_files: i32,
    /// Write buffer size
    pub write_buffer_size: usize,
    /// Maximum write buffers
    pub max_write_buffer_number: i32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024, // 64MB
            max_write_buffer_number: 3,
        }
    }
}

/// Persistent store. Dropping every handle closes the database.
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<RocksDB>,
    path: PathBuf,
}

impl RocksStore {
    /// Open with default config
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(path, DbConfig::default())
    }

    /// Open with custom config
    pub fn open_with_config(path: impl AsRef<Path>, config: DbConfig) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = RocksDB::open_cf_descriptors(&opts, &path, cf_descriptors)?;
        debug!(path = %path.display(), "opened rocksdb store");
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state_cf(&self) -> StorageResult<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(cf::STATE)
            .ok_or_else(|| StorageError::InvalidColumnFamily(cf::STATE.to_string()))
    }
}

impl StorageReader for RocksStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let cf = self.state_cf()?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.state_cf()?;
        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }
}

impl KeyValueStore for RocksStore {
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let cf = self.state_cf()?;
        let mut rocks_batch = RocksBatch::default();
        for op in batch.into_operations() {
            match op {
                BatchOp::Put { key, value } => rocks_batch.put_cf(&cf, &key, &value),
                BatchOp::Delete { key } => rocks_batch.delete_cf(&cf, &key),
            }
        }
        self.db.write(rocks_batch)?;
        Ok(())
    }
}
