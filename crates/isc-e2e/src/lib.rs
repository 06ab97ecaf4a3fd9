//! # isc-e2e
//!
//! End-to-end scenarios for the chain core: requests go through the
//! mempool, are proposed at a logical time, run as VM tasks and leave the
//! pool once their block is adopted.
//!
//! Each test builds a fresh in-memory [`TestChain`]; there is no network,
//! disk or async runtime involved.
//!
//! ## Usage
//!
//! ```ignore
//! cargo test -p isc-e2e
//! ```

mod harness;
pub mod contracts;
mod scenarios;

pub use harness::{ReceiptAssertions, TestAccount, TestChain, FUNDED_BALANCE, TEST_CHAIN_ID};

/// Test result
pub type E2EResult<T> = Result<T, E2EError>;

/// E2E test errors
#[derive(Debug, thiserror::Error)]
pub enum E2EError {
    /// Setup failed
    #[error("setup failed: {0}")]
    Setup(String),

    /// Request could not be built or was not processed
    #[error("request failed: {0}")]
    Request(String),

    /// Batch run failed
    #[error("batch failed: {0}")]
    Run(#[from] isc_vm::RunError),

    /// Signing failed
    #[error("crypto error: {0}")]
    Crypto(#[from] isc_crypto::CryptoError),

    /// View call failed
    #[error("view failed: {0}")]
    View(#[from] isc_types::VmError),
}
