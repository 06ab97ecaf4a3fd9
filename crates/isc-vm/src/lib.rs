//! # isc-vm
//!
//! Execution core of an ISC chain.
//!
//! This crate provides:
//! - [`Sandbox`]: what a contract can see and do during a call
//! - [`ProcessorCache`]: program hash to contract processor, loaded lazily
//!   from the blob store
//! - Core contracts: `root`, `blob`, `accounts`, `governance`, `blocklog`
//! - Gas metering and the gas fee policy
//! - [`run_task`]: deterministic execution of a batch of requests
//!
//! ## Batch execution
//!
//! ```text
//! snapshot ──► request 0 ──► request 1 ──► ... ──► block info ──► ledger check
//!                 │              │
//!              receipt        receipt        (or skip, no receipt)
//! ```
//!
//! Each request runs on a buffer over the state left by the previous one.
//! A failing request keeps only its credited assets, its fee and its
//! receipt. Batch-level failures ([`RunError`]) discard everything.
//!
//! ## Usage
//!
//! ```ignore
//! use isc_vm::{run_task, ProcessorCache, VmTask};
//!
//! let task = VmTask::new(processors, chain_id, snapshot, requests, now);
//! let result = run_task(task)?;
//! state_db.commit(&result.mutations, block_index)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod context;
pub mod core;
mod error;
pub mod gas;
mod genesis;
pub mod processors;
mod sandbox;
mod task;
mod txbuilder;
mod view;

#[cfg(test)]
mod test_utils;

pub use context::MAX_CALL_DEPTH;
pub use error::{LedgerMismatch, RunError, RunResult, SkipReason, MAX_NONCE_GAP};
pub use gas::{BurnCode, GasFeePolicy, GasLimits, GasMeter};
pub use genesis::{init_chain, ChainGenesis};
pub use processors::{
    ContractInterface, EntryPoint, Handler, Processor, ProcessorCache, VmTypeFactory,
};
pub use sandbox::Sandbox;
pub use task::{request_entropy, run_task, OnFinish, VmTask, VmTaskResult};
pub use txbuilder::{L1Output, TransactionEssence, TxBuilder, TxCheckpoint};
pub use view::call_view;
