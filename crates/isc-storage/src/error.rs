//! Storage error types

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// RocksDB error
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Stored bytes do not have the expected shape
    #[error("corrupted record {key}: {reason}")]
    Corrupted {
        /// Key of the record
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// Column family missing from an opened database
    #[error("missing column family: {0}")]
    MissingColumn(&'static str),

    /// Database not open
    #[error("database not open")]
    NotOpen,

    /// Database already open
    #[error("database already open")]
    AlreadyOpen,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
