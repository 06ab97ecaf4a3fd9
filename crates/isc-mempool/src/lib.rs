//! # isc-mempool
//!
//! Request pool of a chain.
//!
//! This crate provides:
//! - Idempotent intake of on-ledger and off-ledger requests
//! - Batch proposals filtered by logical time (timelock / expiration)
//! - Fail-fast removal of requests that can never be processed
//! - In/out counters, events and wakeups for the batch proposer
//!
//! ## Lifecycle
//!
//! ```text
//! Unseen --receive--> Pooled --proposal--> (Proposed) --remove--> Removed
//!                        |
//!                        +--never processable / expired--> Rejected
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use isc_mempool::{Mempool, PoolConfig};
//!
//! let pool = Mempool::with_defaults();
//! pool.receive_requests(vec![request]);
//! let batch = pool.request_batch_proposal(now);
//! pool.remove_requests(&processed_ids);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod pool;

pub use error::RejectReason;
pub use pool::{Mempool, MempoolEvent, PoolConfig, PoolInfo};
