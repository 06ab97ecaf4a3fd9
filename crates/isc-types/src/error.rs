//! Per-request execution errors.
//!
//! A [`VmError`] never aborts a batch: it is recorded in the request's
//! receipt and the request's state changes are rolled back.

use crate::codec::{CodecError, Decodable, DecoderError, Encodable, Rlp, RlpStream};
use crate::Hname;
use std::fmt;
use thiserror::Error;

/// Classification of a request failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum VmErrorCode {
    /// Target contract is not in the registry
    ContractNotFound = 1,
    /// Target contract has no such entry point
    EntryPointNotFound = 2,
    /// Account balance too low
    NotEnoughFunds = 3,
    /// Requested transfer exceeds the granted allowance
    NotEnoughAllowance = 4,
    /// Sender cannot cover the allowance it declared
    NotEnoughFundsForAllowance = 5,
    /// Call burned more gas than its budget
    GasBudgetExceeded = 6,
    /// Caller lacks permission
    Unauthorized = 7,
    /// Item already exists
    AlreadyExists = 8,
    /// Item does not exist
    NotFound = 9,
    /// Malformed or missing call parameters
    InvalidParams = 10,
    /// Contract code panicked
    Panic = 11,
    /// Contract-defined failure
    Generic = 12,
}

impl VmErrorCode {
    /// Numeric form
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Parse the numeric form
    pub fn from_u16(code: u16) -> Option<Self> {
        use VmErrorCode::*;
        Some(match code {
            1 => ContractNotFound,
            2 => EntryPointNotFound,
            3 => NotEnoughFunds,
            4 => NotEnoughAllowance,
            5 => NotEnoughFundsForAllowance,
            6 => GasBudgetExceeded,
            7 => Unauthorized,
            8 => AlreadyExists,
            9 => NotFound,
            10 => InvalidParams,
            11 => Panic,
            12 => Generic,
            _ => return None,
        })
    }
}

impl fmt::Display for VmErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error produced while executing a request
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct VmError {
    /// Classification
    pub code: VmErrorCode,
    /// Human-readable detail
    pub message: String,
}

impl VmError {
    /// New error
    pub fn new(code: VmErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Contract not registered
    pub fn contract_not_found(contract: Hname) -> Self {
        Self::new(VmErrorCode::ContractNotFound, format!("contract {contract} not found"))
    }

    /// Entry point missing on a contract
    pub fn entry_point_not_found(contract: Hname, entry_point: Hname) -> Self {
        Self::new(
            VmErrorCode::EntryPointNotFound,
            format!("entry point {entry_point} not found in contract {contract}"),
        )
    }

    /// Balance too low
    pub fn not_enough_funds(message: impl Into<String>) -> Self {
        Self::new(VmErrorCode::NotEnoughFunds, message)
    }

    /// Transfer exceeds allowance
    pub fn not_enough_allowance(message: impl Into<String>) -> Self {
        Self::new(VmErrorCode::NotEnoughAllowance, message)
    }

    /// Permission denied
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(VmErrorCode::Unauthorized, message)
    }

    /// Item already present
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(VmErrorCode::AlreadyExists, message)
    }

    /// Item absent
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(VmErrorCode::NotFound, message)
    }

    /// Bad parameters
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(VmErrorCode::InvalidParams, message)
    }

    /// Contract-defined failure
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(VmErrorCode::Generic, message)
    }
}

impl From<CodecError> for VmError {
    fn from(e: CodecError) -> Self {
        VmError::invalid_params(e.to_string())
    }
}

impl Encodable for VmError {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.code.as_u16());
        s.append(&self.message);
    }
}

impl Decodable for VmError {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let code = VmErrorCode::from_u16(rlp.val_at(0)?)
            .ok_or(DecoderError::Custom("unknown vm error code"))?;
        Ok(VmError {
            code,
            message: rlp.val_at(1)?,
        })
    }
}
