//! RocksDB handle for committed chain state

use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Rocks = DBWithThreadMode<MultiThreaded>;

const MAX_OPEN_FILES: i32 = 256;
const WRITE_BUFFER_SIZE: usize = 32 << 20;

/// Column families of the state database
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Column {
    /// Committed chain state, one entry per state key
    State,
    /// Bookkeeping such as the latest block index
    Meta,
}

impl Column {
    /// Every column, in creation order
    pub const ALL: [Column; 2] = [Column::State, Column::Meta];

    /// RocksDB column family name
    pub fn name(self) -> &'static str {
        match self {
            Column::State => "state",
            Column::Meta => "meta",
        }
    }
}

/// Shared RocksDB handle that can be opened and closed in place.
///
/// Clones refer to the same underlying database.
#[derive(Clone)]
pub struct Database {
    inner: Arc<RwLock<Option<Rocks>>>,
    path: PathBuf,
}

impl Database {
    /// Handle for the database at `path`; call [`Database::open`] before use
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Open or create the database with all columns
    pub fn open(&self) -> StorageResult<()> {
        let mut guard = self.inner.write();
        if guard.is_some() {
            return Err(StorageError::AlreadyOpen);
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(MAX_OPEN_FILES);
        opts.set_write_buffer_size(WRITE_BUFFER_SIZE);

        let columns = Column::ALL
            .iter()
            .map(|c| ColumnFamilyDescriptor::new(c.name(), Options::default()));
        *guard = Some(Rocks::open_cf_descriptors(&opts, &self.path, columns)?);
        tracing::debug!(path = %self.path.display(), "state database opened");
        Ok(())
    }

    /// Close the database; later reads fail with [`StorageError::NotOpen`]
    pub fn close(&self) {
        self.inner.write().take();
    }

    /// Whether the database is open
    pub fn is_open(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Database directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read one value
    pub fn get(&self, column: Column, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let guard = self.inner.read();
        let db = guard.as_ref().ok_or(StorageError::NotOpen)?;
        Ok(db.get_cf(&handle(db, column)?, key)?)
    }

    /// Write one value outside of a block commit
    pub fn put(&self, column: Column, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let guard = self.inner.read();
        let db = guard.as_ref().ok_or(StorageError::NotOpen)?;
        db.put_cf(&handle(db, column)?, key, value)?;
        Ok(())
    }

    /// Visit every entry of `column` in key order
    pub fn for_each(&self, column: Column, mut f: impl FnMut(&[u8], &[u8])) -> StorageResult<()> {
        let guard = self.inner.read();
        let db = guard.as_ref().ok_or(StorageError::NotOpen)?;
        for item in db.iterator_cf(&handle(db, column)?, IteratorMode::Start) {
            let (key, value) = item?;
            f(&key, &value);
        }
        Ok(())
    }

    /// Apply `writes` atomically
    pub fn write(&self, writes: WriteSet) -> StorageResult<()> {
        let guard = self.inner.read();
        let db = guard.as_ref().ok_or(StorageError::NotOpen)?;
        let state = handle(db, Column::State)?;
        let meta = handle(db, Column::Meta)?;

        let mut batch = WriteBatch::default();
        for (column, key, value) in writes.ops {
            let cf = match column {
                Column::State => &state,
                Column::Meta => &meta,
            };
            match value {
                Some(value) => batch.put_cf(cf, key, value),
                None => batch.delete_cf(cf, key),
            }
        }
        db.write(batch)?;
        Ok(())
    }
}

fn handle(db: &Rocks, column: Column) -> StorageResult<Arc<BoundColumnFamily<'_>>> {
    db.cf_handle(column.name())
        .ok_or(StorageError::MissingColumn(column.name()))
}

/// Writes collected for one atomic [`Database::write`]
#[derive(Default)]
pub struct WriteSet {
    ops: Vec<(Column, Vec<u8>, Option<Vec<u8>>)>,
}

impl WriteSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`
    pub fn put(&mut self, column: Column, key: &[u8], value: &[u8]) {
        self.ops.push((column, key.to_vec(), Some(value.to_vec())));
    }

    /// Remove `key`
    pub fn delete(&mut self, column: Column, key: &[u8]) {
        self.ops.push((column, key.to_vec(), None));
    }

    /// Number of writes
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing was collected
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
