//! Batch-level errors and request skip reasons

use isc_primitives::U256;
use isc_types::{ChainId, Nonce, Timestamp};
use thiserror::Error;

/// Failure that aborts a whole batch without committing anything
#[derive(Debug, Error)]
pub enum RunError {
    /// Account ledger does not add up after the batch
    #[error("inconsistent on-chain account ledger: {0}")]
    LedgerInconsistent(#[from] LedgerMismatch),

    /// Persistent storage failure
    #[error("storage error: {0}")]
    Storage(#[from] isc_storage::StorageError),

    /// Chain state is not what the VM expects
    #[error("invalid chain state: {0}")]
    InvalidState(String),

    /// Task cannot be run
    #[error("invalid task: {0}")]
    InvalidTask(String),
}

/// Result type for batch runs
pub type RunResult<T> = Result<T, RunError>;

/// Difference between the recorded total of a token and the sum of all
/// account balances of it
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerMismatch {
    /// Base tokens, in full-decimal units
    #[error("base tokens: total {total}, sum of accounts {sum}")]
    BaseTokens {
        /// Recorded total
        total: U256,
        /// Sum over accounts
        sum: U256,
    },

    /// A native token
    #[error("native token {token}: total {total}, sum of accounts {sum}")]
    NativeToken {
        /// Token ID, hex
        token: String,
        /// Recorded total
        total: U256,
        /// Sum over accounts
        sum: U256,
    },

    /// An NFT whose owner record and account records disagree
    #[error("nft {nft}: {reason}")]
    Nft {
        /// NFT ID, hex
        nft: String,
        /// What is wrong
        reason: String,
    },
}

/// How far an off-ledger nonce may run ahead of the sender's next nonce
/// and still wait in the pool for the missing ones
pub const MAX_NONCE_GAP: Nonce = 64;

/// Why a request was left out of a block without a receipt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A receipt for the request already exists
    #[error("request already processed")]
    AlreadyProcessed,

    /// Timelock not reached at the batch time
    #[error("timelocked until {timelock}, batch time {now}")]
    Timelocked {
        /// Timelock
        timelock: Timestamp,
        /// Batch time
        now: Timestamp,
    },

    /// Expiration reached at the batch time
    #[error("expired at {expiration}, batch time {now}")]
    Expired {
        /// Expiration
        expiration: Timestamp,
        /// Batch time
        now: Timestamp,
    },

    /// Off-ledger signature does not verify
    #[error("invalid signature")]
    InvalidSignature,

    /// Off-ledger request meant for another chain
    #[error("wrong chain: expected {expected}, got {got}")]
    WrongChain {
        /// This chain
        expected: ChainId,
        /// Request's chain
        got: ChainId,
    },

    /// Off-ledger nonce does not match the sender's next nonce
    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce {
        /// Expected nonce
        expected: Nonce,
        /// Request nonce
        got: Nonce,
    },

    /// Off-ledger sender cannot pay the minimum fee
    #[error("sender cannot cover the minimum gas fee of {fee}")]
    CannotPayMinimumFee {
        /// Minimum fee in base tokens
        fee: u64,
    },
}

impl SkipReason {
    /// Whether the request can become valid in a later batch and so stays
    /// pooled: it is still timelocked, or its nonce is ahead of the sender's
    /// next nonce by at most [`MAX_NONCE_GAP`].
    pub fn is_retryable(&self) -> bool {
        match self {
            SkipReason::Timelocked { .. } => true,
            SkipReason::InvalidNonce { expected, got } => {
                got > expected && got - expected <= MAX_NONCE_GAP
            }
            _ => false,
        }
    }
}
