//! # isc-node
//!
//! Runs one chain: requests are submitted through an inbound channel,
//! pooled in the mempool and executed in batches by the VM.
//!
//! ```text
//! submit ─► inbound channel ─► Mempool ─► proposer ─► VmTask ─► commit
//!                                 ▲          │
//!                                 └── remove consumed requests
//! ```
//!
//! The proposer wakes when the pool receives requests and on a fallback
//! tick, so timelocked requests are picked up once the logical clock has
//! moved past their timelock.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chain;
pub mod cli;
mod clock;
pub mod config;
mod error;
mod genesis;

pub use chain::Chain;
pub use clock::LogicalClock;
pub use config::{Allocation, ChainConfig};
pub use error::{NodeError, NodeResult};
pub use genesis::{load_or_init, StateStore};
