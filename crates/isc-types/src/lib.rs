//! # isc-types
//!
//! Data model of the chain core.
//!
//! - [`Hname`]: 32-bit hash of a contract or entry point name
//! - [`AgentId`]: account owner identity (L1 address, contract, Ethereum address)
//! - [`Assets`]: base tokens, native tokens and NFTs
//! - [`Request`]: on-ledger and off-ledger requests, identified by [`RequestId`]
//! - [`RequestReceipt`], [`BlockInfo`], [`ContractRecord`]: persisted results
//! - [`codec`]: deterministic RLP encoding of everything stored in chain state

#![warn(missing_docs)]
#![warn(clippy::all)]

mod agent_id;
mod assets;
mod block;
pub mod codec;
mod contract;
mod dict;
mod error;
mod hname;
mod receipt;
mod request;

pub use agent_id::{AgentId, ChainId};
pub use assets::{Assets, NativeTokenId, NftId};
pub use block::BlockInfo;
pub use codec::CodecError;
pub use contract::ContractRecord;
pub use dict::Dict;
pub use error::{VmError, VmErrorCode};
pub use hname::{hn, Hname};
pub use receipt::{Event, RequestReceipt};
pub use request::{
    CallTarget, OffLedgerRequest, OnLedgerRequest, Request, RequestId, DEFAULT_GAS_BUDGET,
};

pub use isc_primitives::{Address, BlockIndex, Gas, Nonce, Timestamp, H256, U256};
