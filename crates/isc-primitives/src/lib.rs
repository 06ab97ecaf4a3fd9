//! # isc-primitives
//!
//! Fixed-size value types shared by every crate of the chain core.
//!
//! - [`H256`]: 32-byte hashes (request transaction IDs, program hashes, blob hashes)
//! - [`Address`]: 20-byte L1 addresses
//! - [`U256`]: token amounts

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod error;
mod hash;

pub use address::{Address, AddressError};
pub use error::PrimitiveError;
pub use hash::{HashError, H256};

pub use primitive_types::U256;

/// Index of a block produced by the chain
pub type BlockIndex = u32;

/// Logical chain time, in seconds
pub type Timestamp = u64;

/// Gas units
pub type Gas = u64;

/// Off-ledger request nonce
pub type Nonce = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_token_arithmetic() {
        let supply = U256::from(1_000u64);
        let minted = U256::from(250u64);
        assert_eq!(supply - minted, U256::from(750u64));
        assert!(supply.checked_sub(U256::from(1_001u64)).is_none());
    }
}
