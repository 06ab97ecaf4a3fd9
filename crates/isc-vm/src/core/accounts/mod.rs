//! `accounts`: the on-chain account ledger contract.
//!
//! Funds reach the ledger when the VM credits the assets attached to an
//! on-ledger request to its sender. From there they move only through
//! allowances, foundry mint/melt, fees and withdrawals.

pub mod foundries;
pub mod ledger;

use crate::processors::ContractInterface;
use crate::sandbox::Sandbox;
use isc_types::codec;
use isc_types::{AgentId, Assets, ChainId, Dict, Hname, NativeTokenId, VmError, U256};

core_contract_name!("accounts");

/// `deposit`: optional [`PARAM_AGENT_ID`] receives the attached assets
pub const FUNC_DEPOSIT: &str = "deposit";
/// `withdraw`: sends the allowance to the caller's L1 address
pub const FUNC_WITHDRAW: &str = "withdraw";
/// `transferAllowanceTo`: [`PARAM_AGENT_ID`], optional [`PARAM_ASSETS`]
pub const FUNC_TRANSFER_ALLOWANCE_TO: &str = "transferAllowanceTo";
/// `foundryCreateNew`: [`PARAM_MAX_SUPPLY`] → [`PARAM_FOUNDRY_SN`]
pub const FUNC_FOUNDRY_CREATE_NEW: &str = "foundryCreateNew";
/// `foundryModifySupply`: [`PARAM_FOUNDRY_SN`], [`PARAM_SUPPLY_DELTA`], [`PARAM_DESTROY_TOKENS`]
pub const FUNC_FOUNDRY_MODIFY_SUPPLY: &str = "foundryModifySupply";
/// `foundryDestroy`: [`PARAM_FOUNDRY_SN`]
pub const FUNC_FOUNDRY_DESTROY: &str = "foundryDestroy";
/// `harvest`: optional [`PARAM_RETAIN`]
pub const FUNC_HARVEST: &str = "harvest";

/// `balance`: [`PARAM_AGENT_ID`] → [`PARAM_ASSETS`]
pub const VIEW_BALANCE: &str = "balance";
/// `balanceBaseToken`: [`PARAM_AGENT_ID`] → [`PARAM_BALANCE`]
pub const VIEW_BALANCE_BASE_TOKEN: &str = "balanceBaseToken";
/// `balanceNativeToken`: [`PARAM_AGENT_ID`], [`PARAM_TOKEN_ID`] → [`PARAM_BALANCE`]
pub const VIEW_BALANCE_NATIVE_TOKEN: &str = "balanceNativeToken";
/// `totalAssets` → [`PARAM_ASSETS`]
pub const VIEW_TOTAL_ASSETS: &str = "totalAssets";
/// `accounts`: hex agent ID → agent ID
pub const VIEW_ACCOUNTS: &str = "accounts";
/// `getAccountNonce`: [`PARAM_AGENT_ID`] → [`PARAM_NONCE`]
pub const VIEW_GET_ACCOUNT_NONCE: &str = "getAccountNonce";
/// `foundryOutput`: [`PARAM_FOUNDRY_SN`] → [`PARAM_FOUNDRY`]
pub const VIEW_FOUNDRY_OUTPUT: &str = "foundryOutput";
/// `accountNFTs`: [`PARAM_AGENT_ID`] → [`PARAM_NFTS`]
pub const VIEW_ACCOUNT_NFTS: &str = "accountNFTs";

/// Agent ID
pub const PARAM_AGENT_ID: &str = "a";
/// Assets
pub const PARAM_ASSETS: &str = "as";
/// Balance of one token
pub const PARAM_BALANCE: &str = "B";
/// Native token ID
pub const PARAM_TOKEN_ID: &str = "N";
/// Account nonce
pub const PARAM_NONCE: &str = "n";
/// Foundry maximum supply
pub const PARAM_MAX_SUPPLY: &str = "ms";
/// Foundry serial number
pub const PARAM_FOUNDRY_SN: &str = "s";
/// Supply change
pub const PARAM_SUPPLY_DELTA: &str = "d";
/// Whether the supply change melts tokens
pub const PARAM_DESTROY_TOKENS: &str = "y";
/// Foundry record
pub const PARAM_FOUNDRY: &str = "f";
/// List of NFT IDs
pub const PARAM_NFTS: &str = "nfts";
/// Base tokens the common account keeps on harvest
pub const PARAM_RETAIN: &str = "r";

/// Base tokens left on the common account by a harvest without
/// [`PARAM_RETAIN`]
pub const MIN_COMMON_ACCOUNT_BALANCE: u64 = 1_000;

/// Account collecting gas fees and funds of requests without a sender
pub fn common_account(chain_id: ChainId) -> AgentId {
    AgentId::contract(chain_id, Hname::NIL)
}

fn agent_param(ctx: &dyn Sandbox) -> Result<AgentId, VmError> {
    Ok(ctx
        .params()
        .get_value(PARAM_AGENT_ID)?
        .unwrap_or_else(|| ctx.caller()))
}

fn deposit(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let Some(target) = ctx.params().get_value::<AgentId>(PARAM_AGENT_ID)? else {
        return Ok(Dict::new());
    };
    let caller = ctx.caller();
    // the sender keeps enough of the incoming base tokens for the request fee
    let mut moved = ctx.incoming().clone();
    moved.base_tokens = moved.base_tokens.saturating_sub(ctx.min_request_fee());
    if !moved.is_empty() && target != caller {
        if !ledger::move_between_accounts(&mut ctx.state(), &caller, &target, &moved) {
            return Err(VmError::not_enough_funds(format!(
                "{caller} cannot deposit {moved}"
            )));
        }
        ctx.log(&format!("deposited {moved} to {target}"));
    }
    Ok(Dict::new())
}

fn withdraw(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let caller = ctx.caller();
    let target = caller
        .address()
        .ok_or_else(|| VmError::unauthorized(format!("{caller} cannot withdraw to L1")))?;
    if ctx.allowance().is_empty() {
        return Err(VmError::invalid_params("withdraw needs a non-empty allowance"));
    }
    let me = ctx.contract_agent_id();
    let assets = ctx.transfer_allowed_funds(&me, None)?;
    ctx.send_to_l1(target, &assets)?;
    ctx.log(&format!("withdrew {assets} to {target}"));
    Ok(Dict::new())
}

fn transfer_allowance_to(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let target: AgentId = ctx.params().require(PARAM_AGENT_ID)?;
    let assets: Option<Assets> = ctx.params().get_value(PARAM_ASSETS)?;
    ctx.transfer_allowed_funds(&target, assets.as_ref())?;
    Ok(Dict::new())
}

fn foundry_create_new(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let max_supply: U256 = ctx.params().require(PARAM_MAX_SUPPLY)?;
    if max_supply.is_zero() {
        return Err(VmError::invalid_params("maximum supply must be positive"));
    }
    let caller = ctx.caller();
    let serial = foundries::create_foundry(&mut ctx.state(), &caller, max_supply);
    ctx.event("foundry.create", codec::encode(&serial))?;
    Ok(Dict::new().with_value(PARAM_FOUNDRY_SN, &serial))
}

fn owned_foundry(ctx: &dyn Sandbox, serial: u32) -> Result<foundries::FoundryRecord, VmError> {
    let record = foundries::get_foundry(&ctx.state_reader(), serial)
        .ok_or_else(|| VmError::not_found(format!("foundry {serial} not found")))?;
    ctx.require_caller(&record.owner)?;
    Ok(record)
}

fn foundry_modify_supply(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let serial: u32 = ctx.params().require(PARAM_FOUNDRY_SN)?;
    let delta: U256 = ctx.params().require(PARAM_SUPPLY_DELTA)?;
    let destroy: bool = ctx.params().get_or(PARAM_DESTROY_TOKENS, false)?;
    let mut record = owned_foundry(ctx, serial)?;
    let caller = ctx.caller();
    let tokens = Assets::new().with_native_token(record.token_id(&ctx.chain_id()), delta);

    let mut state = ctx.state();
    if destroy {
        if !ledger::debit(&mut state, &caller, &tokens) {
            return Err(VmError::not_enough_funds(format!(
                "cannot melt {delta} tokens of foundry {serial}"
            )));
        }
        record.melted = record.melted.saturating_add(delta);
    } else {
        let within_max = record
            .circulating_supply()
            .checked_add(delta)
            .is_some_and(|supply| supply <= record.max_supply);
        if !within_max {
            return Err(VmError::invalid_params(format!(
                "minting {delta} exceeds the maximum supply of foundry {serial}"
            )));
        }
        ledger::credit(&mut state, &caller, &tokens);
        record.minted = record.minted.saturating_add(delta);
    }
    foundries::save_foundry(&mut state, &record);
    Ok(Dict::new())
}

fn foundry_destroy(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let serial: u32 = ctx.params().require(PARAM_FOUNDRY_SN)?;
    let record = owned_foundry(ctx, serial)?;
    if !record.circulating_supply().is_zero() {
        return Err(VmError::invalid_params(format!(
            "foundry {serial} still has {} tokens in circulation",
            record.circulating_supply()
        )));
    }
    foundries::delete_foundry(&mut ctx.state(), serial);
    Ok(Dict::new())
}

fn harvest(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    ctx.require_chain_owner()?;
    let retain: u64 = ctx.params().get_or(PARAM_RETAIN, MIN_COMMON_ACCOUNT_BALANCE)?;
    let common = common_account(ctx.chain_id());
    let owner = ctx.caller();

    let mut assets = ledger::get_assets(&ctx.state_reader(), &common);
    assets.base_tokens = assets.base_tokens.saturating_sub(retain);
    if assets.is_empty() {
        return Ok(Dict::new());
    }
    if !ledger::move_between_accounts(&mut ctx.state(), &common, &owner, &assets) {
        return Err(VmError::not_enough_funds("common account changed during harvest"));
    }
    ctx.log(&format!("harvested {assets}"));
    Ok(Dict::new().with_value(PARAM_ASSETS, &assets))
}

fn view_balance(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let agent = agent_param(ctx)?;
    let assets = ledger::get_assets(&ctx.state_reader(), &agent);
    Ok(Dict::new().with_value(PARAM_ASSETS, &assets))
}

fn view_balance_base_token(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let agent = agent_param(ctx)?;
    let balance = ledger::get_base_tokens(&ctx.state_reader(), &agent);
    Ok(Dict::new().with_value(PARAM_BALANCE, &balance))
}

fn view_balance_native_token(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let agent = agent_param(ctx)?;
    let token: NativeTokenId = ctx.params().require(PARAM_TOKEN_ID)?;
    let balance = ledger::get_native_token(&ctx.state_reader(), &agent, &token);
    Ok(Dict::new().with_value(PARAM_BALANCE, &balance))
}

fn view_total_assets(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let total = ledger::total_assets(&ctx.state_reader());
    Ok(Dict::new().with_value(PARAM_ASSETS, &total))
}

fn view_accounts(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    Ok(ledger::all_accounts(&ctx.state_reader())
        .into_iter()
        .map(|agent| (hex::encode(agent.to_bytes()), codec::encode(&agent)))
        .collect())
}

fn view_get_account_nonce(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let agent = agent_param(ctx)?;
    let nonce = ledger::get_nonce(&ctx.state_reader(), &agent);
    Ok(Dict::new().with_value(PARAM_NONCE, &nonce))
}

fn view_foundry_output(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let serial: u32 = ctx.params().require(PARAM_FOUNDRY_SN)?;
    let record = foundries::get_foundry(&ctx.state_reader(), serial)
        .ok_or_else(|| VmError::not_found(format!("foundry {serial} not found")))?;
    Ok(Dict::new().with_value(PARAM_FOUNDRY, &record))
}

fn view_account_nfts(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let agent = agent_param(ctx)?;
    let nfts: Vec<_> = ledger::get_nfts(&ctx.state_reader(), &agent).into_iter().collect();
    Ok(Dict::new().with(PARAM_NFTS, codec::encode_list(&nfts)))
}

/// Contract interface
pub fn interface() -> ContractInterface {
    ContractInterface::new(NAME, "Chain account ledger")
        .func(FUNC_DEPOSIT, deposit)
        .func(FUNC_WITHDRAW, withdraw)
        .func(FUNC_TRANSFER_ALLOWANCE_TO, transfer_allowance_to)
        .func(FUNC_FOUNDRY_CREATE_NEW, foundry_create_new)
        .func(FUNC_FOUNDRY_MODIFY_SUPPLY, foundry_modify_supply)
        .func(FUNC_FOUNDRY_DESTROY, foundry_destroy)
        .func(FUNC_HARVEST, harvest)
        .view(VIEW_BALANCE, view_balance)
        .view(VIEW_BALANCE_BASE_TOKEN, view_balance_base_token)
        .view(VIEW_BALANCE_NATIVE_TOKEN, view_balance_native_token)
        .view(VIEW_TOTAL_ASSETS, view_total_assets)
        .view(VIEW_ACCOUNTS, view_accounts)
        .view(VIEW_GET_ACCOUNT_NONCE, view_get_account_nonce)
        .view(VIEW_FOUNDRY_OUTPUT, view_foundry_output)
        .view(VIEW_ACCOUNT_NFTS, view_account_nfts)
}
