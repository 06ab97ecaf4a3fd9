//! Persistent committed state

use crate::db::{Column, Database, WriteSet};
use crate::error::{StorageError, StorageResult};
use crate::kv::Mutations;
use crate::snapshot::StateSnapshot;

const LATEST_BLOCK_KEY: &[u8] = b"latest_block_index";

/// Committed chain state backed by RocksDB.
///
/// The whole state is loaded into a [`StateSnapshot`] at startup; each
/// produced block is then persisted as one atomic batch of its mutations.
pub struct StateDb {
    db: Database,
}

impl StateDb {
    /// Wrap an opened database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Load all committed state
    pub fn load_snapshot(&self) -> StorageResult<StateSnapshot> {
        let mut entries = Vec::new();
        self.db
            .for_each(Column::State, |k, v| entries.push((k.to_vec(), v.to_vec())))?;
        tracing::debug!(keys = entries.len(), "state loaded");
        Ok(entries.into_iter().collect())
    }

    /// Atomically persist the mutations of block `block_index`
    pub fn commit(&self, mutations: &Mutations, block_index: u32) -> StorageResult<()> {
        let mut writes = WriteSet::new();
        for key in &mutations.dels {
            writes.delete(Column::State, key);
        }
        for (key, value) in &mutations.sets {
            writes.put(Column::State, key, value);
        }
        writes.put(Column::Meta, LATEST_BLOCK_KEY, &block_index.to_be_bytes());
        self.db.write(writes)
    }

    /// Index of the last committed block, if any
    pub fn latest_block_index(&self) -> StorageResult<Option<u32>> {
        match self.db.get(Column::Meta, LATEST_BLOCK_KEY)? {
            None => Ok(None),
            Some(bytes) => {
                let arr: [u8; 4] = bytes.as_slice().try_into().map_err(|_| StorageError::Corrupted {
                    key: "latest_block_index".into(),
                    reason: format!("expected 4 bytes, got {}", bytes.len()),
                })?;
                Ok(Some(u32::from_be_bytes(arr)))
            }
        }
    }
}
