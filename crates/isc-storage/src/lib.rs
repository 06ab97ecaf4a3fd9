//! # isc-storage
//!
//! State storage for the chain core.
//!
//! This crate provides:
//! - [`KvReader`] / [`KvWriter`]: the key/value interface contracts and the VM see
//! - [`StateSnapshot`]: immutable state with O(1) copy
//! - [`BufferedKv`]: a snapshot plus uncommitted [`Mutations`], used per request
//! - [`SubRealm`]: per-contract key partitioning
//! - [`Map`] / [`MapReader`]: counted maps stored under a name prefix
//! - [`Database`] / [`StateDb`]: RocksDB persistence of committed state

#![warn(missing_docs)]
#![warn(clippy::all)]

mod buffered;
mod collections;
mod db;
mod error;
mod kv;
mod snapshot;
mod state_db;
mod subrealm;

pub use buffered::BufferedKv;
pub use collections::{Map, MapReader};
pub use db::{Column, Database, WriteSet};
pub use error::{StorageError, StorageResult};
pub use kv::{KvReader, KvWriter, Mutations};
pub use snapshot::StateSnapshot;
pub use state_db::StateDb;
pub use subrealm::{SubRealm, SubRealmReader};
