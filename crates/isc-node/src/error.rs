//! Error types for the chain runner

use thiserror::Error;

/// Chain runner errors
#[derive(Debug, Error)]
pub enum NodeError {
    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] isc_storage::StorageError),

    /// Batch run failed; nothing was committed
    #[error("batch failed: {0}")]
    Run(#[from] isc_vm::RunError),

    /// Invalid configuration
    #[error("invalid config: {0}")]
    Config(String),

    /// Config file could not be parsed
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The chain was stopped
    #[error("chain stopped")]
    Stopped,

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for chain runner operations
pub type NodeResult<T> = Result<T, NodeError>;
