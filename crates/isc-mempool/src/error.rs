//! Reasons a request leaves the pool unprocessed

use isc_types::Timestamp;
use thiserror::Error;

/// Why a request was refused or dropped
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Timelock at or after expiration: can never become processable
    #[error("timelock {timelock} is not before expiration {expiration}")]
    TimelockAfterExpiration {
        /// Timelock
        timelock: Timestamp,
        /// Expiration
        expiration: Timestamp,
    },

    /// Expiration passed before the request was processed
    #[error("expired at {expiration}, now {now}")]
    Expired {
        /// Expiration
        expiration: Timestamp,
        /// Logical time of the proposal
        now: Timestamp,
    },

    /// Off-ledger request signature does not verify
    #[error("invalid signature")]
    InvalidSignature,

    /// Pool is at capacity
    #[error("pool is full (max size: {0})")]
    PoolFull(usize),
}
