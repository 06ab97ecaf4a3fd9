//! Test contracts.
//!
//! ## counter
//! - `init`: start value from param `v`
//! - `inc`: increment, emit `inc`
//! - `boom`: write, then panic
//! - `get` (view): current value
//!
//! ## bad
//! - `init`: always panics
//!
//! ## mul (blob-deployed)
//! A program stored in the blob contract whose binary is a decimal
//! multiplier. `apply` (view) returns param `x` times the multiplier.
//!
//! Requests reach these contracts through the mempool, which proposes
//! on-ledger requests in request ID order, not submission order. Scenarios
//! look receipts up by request ID.

use isc_storage::{KvReader, KvWriter};
use isc_types::codec;
use isc_types::{Dict, VmError};
use isc_vm::{ContractInterface, Processor, VmTypeFactory};
use isc_vm::processors::{FIELD_PROGRAM, FIELD_VM_TYPE};
use std::sync::Arc;

/// Storage key of the counter value
const KEY_COUNTER: &[u8] = b"c";

/// Counter param and result key
pub const PARAM_VALUE: &str = "v";

/// Multiplier input param
pub const PARAM_X: &str = "x";

/// VM type name of blob-deployed multiplier programs
pub const MUL_VM_TYPE: &str = "mul";

fn read_counter(state: &dyn KvReader) -> u64 {
    state
        .get(KEY_COUNTER)
        .and_then(|b| codec::decode(&b).ok())
        .unwrap_or_default()
}

/// Counter contract
pub fn counter() -> ContractInterface {
    ContractInterface::new("counter", "e2e counter")
        .func("init", |ctx| {
            let start: u64 = ctx.params().get_or(PARAM_VALUE, 0)?;
            ctx.state().set(KEY_COUNTER, codec::encode(&start));
            Ok(Dict::new())
        })
        .func("inc", |ctx| {
            let value = read_counter(&ctx.state_reader()) + 1;
            ctx.state().set(KEY_COUNTER, codec::encode(&value));
            ctx.event("inc", codec::encode(&value))?;
            Ok(Dict::new().with_value(PARAM_VALUE, &value))
        })
        .func("boom", |ctx| {
            ctx.state().set(KEY_COUNTER, codec::encode(&999u64));
            ctx.event("boom", Vec::new())?;
            panic!("boom")
        })
        .view("get", |ctx| {
            Ok(Dict::new().with_value(PARAM_VALUE, &read_counter(&ctx.state_reader())))
        })
}

/// Contract whose constructor always panics
pub fn bad() -> ContractInterface {
    ContractInterface::new("bad", "constructor panics").func("init", |ctx| {
        ctx.state().set(b"half", b"written".to_vec());
        panic!("constructor exploded")
    })
}

/// Builds multiplier processors from blob binaries
pub struct MulFactory;

impl VmTypeFactory for MulFactory {
    fn new_processor(&self, program: &[u8]) -> Result<Arc<dyn Processor>, VmError> {
        let factor: u64 = std::str::from_utf8(program)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| VmError::invalid_params("multiplier program is not a number"))?;
        let iface = ContractInterface::new("mul", "multiplier").view("apply", move |ctx| {
            let x: u64 = ctx.params().require(PARAM_X)?;
            Ok(Dict::new().with_value(PARAM_VALUE, &x.saturating_mul(factor)))
        });
        Ok(Arc::new(iface))
    }
}

/// Blob fields of a multiplier program
pub fn mul_program(factor: u64) -> Dict {
    Dict::new()
        .with(FIELD_VM_TYPE, MUL_VM_TYPE.as_bytes().to_vec())
        .with(FIELD_PROGRAM, factor.to_string().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_factory_rejects_garbage() {
        assert!(MulFactory.new_processor(b"not a number").is_err());
        assert!(MulFactory.new_processor(b"3").is_ok());
    }

    #[test]
    fn test_contract_program_hashes_differ() {
        assert_ne!(counter().program_hash(), bad().program_hash());
    }
}
