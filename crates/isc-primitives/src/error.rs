//! Primitive parsing errors

use crate::address::AddressError;
use crate::hash::HashError;
use thiserror::Error;

/// Error raised while parsing a primitive value
#[derive(Debug, Error)]
pub enum PrimitiveError {
    /// Address error
    #[error("address error: {0}")]
    Address(#[from] AddressError),

    /// Hash error
    #[error("hash error: {0}")]
    Hash(#[from] HashError),
}
