//! `governance`: chain owner, gas fee policy and gas limits

use crate::gas::{GasFeePolicy, GasLimits};
use crate::processors::ContractInterface;
use crate::sandbox::Sandbox;
use isc_storage::{KvReader, KvWriter};
use isc_types::codec;
use isc_types::{AgentId, Dict, VmError};

core_contract_name!("governance");

/// `delegateChainOwnership`: [`PARAM_CHAIN_OWNER`]
pub const FUNC_DELEGATE_CHAIN_OWNERSHIP: &str = "delegateChainOwnership";
/// `claimChainOwnership`
pub const FUNC_CLAIM_CHAIN_OWNERSHIP: &str = "claimChainOwnership";
/// `setGasFeePolicy`: [`PARAM_FEE_POLICY`]
pub const FUNC_SET_GAS_FEE_POLICY: &str = "setGasFeePolicy";
/// `setGasLimits`: [`PARAM_GAS_LIMITS`]
pub const FUNC_SET_GAS_LIMITS: &str = "setGasLimits";
/// `getChainOwner` → [`PARAM_CHAIN_OWNER`]
pub const VIEW_GET_CHAIN_OWNER: &str = "getChainOwner";
/// `getGasFeePolicy` → [`PARAM_FEE_POLICY`]
pub const VIEW_GET_GAS_FEE_POLICY: &str = "getGasFeePolicy";
/// `getGasLimits` → [`PARAM_GAS_LIMITS`]
pub const VIEW_GET_GAS_LIMITS: &str = "getGasLimits";
/// `getChainInfo` → chain ID, owner, fee policy and limits
pub const VIEW_GET_CHAIN_INFO: &str = "getChainInfo";

/// Chain owner
pub const PARAM_CHAIN_OWNER: &str = "o";
/// Gas fee policy
pub const PARAM_FEE_POLICY: &str = "g";
/// Gas limits
pub const PARAM_GAS_LIMITS: &str = "l";
/// Chain ID
pub const PARAM_CHAIN_ID: &str = "c";

const KEY_OWNER: &[u8] = b"o";
const KEY_DELEGATED_OWNER: &[u8] = b"d";
const KEY_FEE_POLICY: &[u8] = b"g";
const KEY_GAS_LIMITS: &[u8] = b"l";

/// Write the initial configuration
pub fn init(state: &mut dyn KvWriter, owner: &AgentId, policy: &GasFeePolicy, limits: &GasLimits) {
    state.set(KEY_OWNER, codec::encode(owner));
    state.set(KEY_FEE_POLICY, codec::encode(policy));
    state.set(KEY_GAS_LIMITS, codec::encode(limits));
}

/// Current chain owner; [`AgentId::Nil`] before genesis
pub fn chain_owner(state: &dyn KvReader) -> AgentId {
    state
        .get(KEY_OWNER)
        .and_then(|b| codec::decode(&b).ok())
        .unwrap_or(AgentId::Nil)
}

/// Agent allowed to claim ownership
pub fn delegated_owner(state: &dyn KvReader) -> Option<AgentId> {
    state.get(KEY_DELEGATED_OWNER).and_then(|b| codec::decode(&b).ok())
}

/// Gas fee policy
pub fn fee_policy(state: &dyn KvReader) -> GasFeePolicy {
    state
        .get(KEY_FEE_POLICY)
        .and_then(|b| codec::decode(&b).ok())
        .unwrap_or_default()
}

/// Gas limits
pub fn gas_limits(state: &dyn KvReader) -> GasLimits {
    state
        .get(KEY_GAS_LIMITS)
        .and_then(|b| codec::decode(&b).ok())
        .unwrap_or_default()
}

fn delegate_chain_ownership(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    ctx.require_chain_owner()?;
    let delegate: AgentId = ctx.params().require(PARAM_CHAIN_OWNER)?;
    ctx.state().set(KEY_DELEGATED_OWNER, codec::encode(&delegate));
    ctx.log(&format!("chain ownership delegated to {delegate}"));
    Ok(Dict::new())
}

fn claim_chain_ownership(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let caller = ctx.caller();
    let delegated = delegated_owner(&ctx.state_reader());
    if delegated.as_ref() != Some(&caller) {
        return Err(VmError::unauthorized(format!(
            "{caller} was not delegated chain ownership"
        )));
    }
    let mut state = ctx.state();
    state.set(KEY_OWNER, codec::encode(&caller));
    state.del(KEY_DELEGATED_OWNER);
    drop(state);
    ctx.event("owner", codec::encode(&caller))?;
    Ok(Dict::new())
}

fn set_gas_fee_policy(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    ctx.require_chain_owner()?;
    let policy: GasFeePolicy = ctx.params().require(PARAM_FEE_POLICY)?;
    if policy.gas_per_token.0 == 0 {
        return Err(VmError::invalid_params("gas side of gas_per_token must be positive"));
    }
    if policy.validator_fee_share > 100 {
        return Err(VmError::invalid_params("validator fee share above 100%"));
    }
    ctx.state().set(KEY_FEE_POLICY, codec::encode(&policy));
    Ok(Dict::new())
}

fn set_gas_limits(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    ctx.require_chain_owner()?;
    let limits: GasLimits = ctx.params().require(PARAM_GAS_LIMITS)?;
    if limits.max_gas_per_request == 0 || limits.min_gas_per_request > limits.max_gas_per_request {
        return Err(VmError::invalid_params(format!(
            "invalid gas limits: min {} max {}",
            limits.min_gas_per_request, limits.max_gas_per_request
        )));
    }
    ctx.state().set(KEY_GAS_LIMITS, codec::encode(&limits));
    Ok(Dict::new())
}

fn view_chain_owner(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    Ok(Dict::new().with_value(PARAM_CHAIN_OWNER, &chain_owner(&ctx.state_reader())))
}

fn view_gas_fee_policy(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    Ok(Dict::new().with_value(PARAM_FEE_POLICY, &fee_policy(&ctx.state_reader())))
}

fn view_gas_limits(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    Ok(Dict::new().with_value(PARAM_GAS_LIMITS, &gas_limits(&ctx.state_reader())))
}

fn view_chain_info(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let state = ctx.state_reader();
    Ok(Dict::new()
        .with_value(PARAM_CHAIN_ID, &ctx.chain_id())
        .with_value(PARAM_CHAIN_OWNER, &chain_owner(&state))
        .with_value(PARAM_FEE_POLICY, &fee_policy(&state))
        .with_value(PARAM_GAS_LIMITS, &gas_limits(&state)))
}

/// Contract interface
pub fn interface() -> ContractInterface {
    ContractInterface::new(NAME, "Chain governance")
        .func(FUNC_DELEGATE_CHAIN_OWNERSHIP, delegate_chain_ownership)
        .func(FUNC_CLAIM_CHAIN_OWNERSHIP, claim_chain_ownership)
        .func(FUNC_SET_GAS_FEE_POLICY, set_gas_fee_policy)
        .func(FUNC_SET_GAS_LIMITS, set_gas_limits)
        .view(VIEW_GET_CHAIN_OWNER, view_chain_owner)
        .view(VIEW_GET_GAS_FEE_POLICY, view_gas_fee_policy)
        .view(VIEW_GET_GAS_LIMITS, view_gas_limits)
        .view(VIEW_GET_CHAIN_INFO, view_chain_info)
}
