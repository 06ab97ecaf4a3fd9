//! # isc-crypto
//!
//! Cryptographic primitives of the chain core.
//!
//! - [`keccak256`]: the chain's hash function (hnames, blob hashes, request IDs)
//! - secp256k1 signatures for off-ledger requests, with low-s normalization
//! - L1 address derivation from public keys

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod hash;
mod signature;

pub use error::CryptoError;
pub use hash::{keccak256, keccak256_concat};
pub use signature::{
    public_key_from_bytes, public_key_to_address, recover_signer, sign, verify, KeyPair,
    PrivateKey, PublicKey, Signature,
};
