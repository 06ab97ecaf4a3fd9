//! `root`: the contract registry and deployment permissions.
//!
//! State layout:
//! - map `r`: contract hname → [`ContractRecord`]
//! - map `p`: agent ID → deploy permission
//! - `a`: whether deploy permissions are enforced (absent means enforced)

use crate::gas::BurnCode;
use crate::processors::{ContractInterface, INIT};
use crate::sandbox::Sandbox;
use isc_storage::{KvReader, KvWriter, Map, MapReader};
use isc_types::codec;
use isc_types::{hn, AgentId, Assets, ContractRecord, Dict, Hname, VmError, H256};

core_contract_name!("root");

/// `deployContract`: [`PARAM_NAME`], [`PARAM_PROGRAM_HASH`], optional
/// [`PARAM_DESCRIPTION`]; the other params go to the constructor
pub const FUNC_DEPLOY_CONTRACT: &str = "deployContract";
/// `grantDeployPermission`: [`PARAM_DEPLOYER`]
pub const FUNC_GRANT_DEPLOY_PERMISSION: &str = "grantDeployPermission";
/// `revokeDeployPermission`: [`PARAM_DEPLOYER`]
pub const FUNC_REVOKE_DEPLOY_PERMISSION: &str = "revokeDeployPermission";
/// `requireDeployPermissions`: [`PARAM_DEPLOY_PERMISSIONS_ENABLED`]
pub const FUNC_REQUIRE_DEPLOY_PERMISSIONS: &str = "requireDeployPermissions";
/// `findContract`: [`PARAM_HNAME`] → [`PARAM_CONTRACT_FOUND`], [`PARAM_CONTRACT_RECORD_DATA`]
pub const VIEW_FIND_CONTRACT: &str = "findContract";
/// `getContractRecords` → [`PARAM_CONTRACT_REGISTRY`]
pub const VIEW_GET_CONTRACT_RECORDS: &str = "getContractRecords";

/// Contract name
pub const PARAM_NAME: &str = "nm";
/// Program hash
pub const PARAM_PROGRAM_HASH: &str = "ph";
/// Contract description
pub const PARAM_DESCRIPTION: &str = "ds";
/// Agent granted or revoked deploy permission
pub const PARAM_DEPLOYER: &str = "dp";
/// Whether deploy permissions are enforced
pub const PARAM_DEPLOY_PERMISSIONS_ENABLED: &str = "de";
/// Contract hname
pub const PARAM_HNAME: &str = "hn";
/// Whether the contract was found
pub const PARAM_CONTRACT_FOUND: &str = "cf";
/// Encoded contract record
pub const PARAM_CONTRACT_RECORD_DATA: &str = "dt";
/// List of contract records
pub const PARAM_CONTRACT_REGISTRY: &str = "r";

/// Event topic for a deployed contract
pub const EVENT_DEPLOY: &str = "deploy";

const KEY_REGISTRY: &[u8] = b"r";
const KEY_PERMISSIONS: &[u8] = b"p";
const KEY_PERMISSIONS_ENABLED: &[u8] = b"a";

/// Record of contract `hname`
pub fn find_contract(state: &dyn KvReader, hname: Hname) -> Option<ContractRecord> {
    MapReader::new(state, KEY_REGISTRY)
        .get_at(&hname.to_bytes())
        .and_then(|b| codec::decode(&b).ok())
}

/// Store a record without any checks
pub fn register_contract(state: &mut dyn KvWriter, record: &ContractRecord) {
    Map::new(state, KEY_REGISTRY).set_at(&record.hname().to_bytes(), codec::encode(record));
}

/// Number of deployed contracts
pub fn contract_count(state: &dyn KvReader) -> u32 {
    MapReader::new(state, KEY_REGISTRY).len()
}

/// All records, in hname order
pub fn contract_records(state: &dyn KvReader) -> Vec<ContractRecord> {
    let mut out = Vec::new();
    MapReader::new(state, KEY_REGISTRY).iterate(&mut |_, v| {
        if let Ok(record) = codec::decode::<ContractRecord>(v) {
            out.push(record);
        }
        true
    });
    out
}

/// Whether deploy permissions are enforced
pub fn deploy_permissions_enabled(state: &dyn KvReader) -> bool {
    state
        .get(KEY_PERMISSIONS_ENABLED)
        .and_then(|b| codec::decode::<bool>(&b).ok())
        .unwrap_or(true)
}

/// Whether `agent` was granted deploy permission
pub fn has_deploy_permission(state: &dyn KvReader, agent: &AgentId) -> bool {
    MapReader::new(state, KEY_PERMISSIONS).has_at(&agent.to_bytes())
}

fn can_deploy(ctx: &dyn Sandbox, caller: &AgentId) -> bool {
    let state = ctx.state_reader();
    *caller == ctx.chain_owner()
        || !deploy_permissions_enabled(&state)
        || has_deploy_permission(&state, caller)
}

fn deploy_contract(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let caller = ctx.caller();
    if !can_deploy(ctx, &caller) {
        return Err(VmError::unauthorized(format!(
            "{caller} has no permission to deploy contracts"
        )));
    }

    let mut init_params = ctx.params().clone();
    let name: String = init_params.require(PARAM_NAME)?;
    let program_hash: H256 = init_params.require(PARAM_PROGRAM_HASH)?;
    let description: String = init_params.get_or(PARAM_DESCRIPTION, String::new())?;
    for key in [PARAM_NAME, PARAM_PROGRAM_HASH, PARAM_DESCRIPTION] {
        init_params.remove(key);
    }
    if name.is_empty() {
        return Err(VmError::invalid_params("contract name is empty"));
    }

    let hname = hn(&name);
    if find_contract(&ctx.state_reader(), hname).is_some() {
        return Err(VmError::already_exists(format!(
            "contract '{name}' ({hname}) already exists"
        )));
    }

    ctx.burn_gas(BurnCode::DeployContract, 0)?;
    ctx.load_program(&program_hash)?;

    let record = ContractRecord::new(name, description, program_hash, caller);
    register_contract(&mut ctx.state(), &record);
    ctx.event(EVENT_DEPLOY, codec::encode(&hname))?;
    ctx.log(&format!("deployed contract '{}' ({hname})", record.name));

    // a failing constructor fails the whole call, which drops the record
    ctx.call(hname, hn(INIT), init_params, Assets::new())?;
    Ok(Dict::new())
}

fn grant_deploy_permission(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    ctx.require_chain_owner()?;
    let deployer: AgentId = ctx.params().require(PARAM_DEPLOYER)?;
    Map::new(&mut ctx.state(), KEY_PERMISSIONS).set_at(&deployer.to_bytes(), vec![1]);
    Ok(Dict::new())
}

fn revoke_deploy_permission(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    ctx.require_chain_owner()?;
    let deployer: AgentId = ctx.params().require(PARAM_DEPLOYER)?;
    Map::new(&mut ctx.state(), KEY_PERMISSIONS).del_at(&deployer.to_bytes());
    Ok(Dict::new())
}

fn require_deploy_permissions(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    ctx.require_chain_owner()?;
    let enabled: bool = ctx.params().require(PARAM_DEPLOY_PERMISSIONS_ENABLED)?;
    ctx.state().set(KEY_PERMISSIONS_ENABLED, codec::encode(&enabled));
    Ok(Dict::new())
}

fn view_find_contract(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let hname: Hname = ctx.params().require(PARAM_HNAME)?;
    Ok(match find_contract(&ctx.state_reader(), hname) {
        Some(record) => Dict::new()
            .with_value(PARAM_CONTRACT_FOUND, &true)
            .with_value(PARAM_CONTRACT_RECORD_DATA, &record),
        None => Dict::new().with_value(PARAM_CONTRACT_FOUND, &false),
    })
}

fn view_contract_records(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let records = contract_records(&ctx.state_reader());
    Ok(Dict::new().with(PARAM_CONTRACT_REGISTRY, codec::encode_list(&records)))
}

/// Contract interface
pub fn interface() -> ContractInterface {
    ContractInterface::new(NAME, "Contract registry")
        .func(FUNC_DEPLOY_CONTRACT, deploy_contract)
        .func(FUNC_GRANT_DEPLOY_PERMISSION, grant_deploy_permission)
        .func(FUNC_REVOKE_DEPLOY_PERMISSION, revoke_deploy_permission)
        .func(FUNC_REQUIRE_DEPLOY_PERMISSIONS, require_deploy_permissions)
        .view(VIEW_FIND_CONTRACT, view_find_contract)
        .view(VIEW_GET_CONTRACT_RECORDS, view_contract_records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::partition;
    use crate::test_utils::{agent, counter_contract, TestVm, OWNER};
    use isc_storage::StateSnapshot;
    use isc_types::{RequestReceipt, VmErrorCode};

    fn code(receipt: &RequestReceipt) -> Option<VmErrorCode> {
        receipt.error.as_ref().map(|e| e.code)
    }

    fn deploy(vm: &mut TestVm, sender: &AgentId, name: &str, init: Dict) -> RequestReceipt {
        let params = init
            .with_value(PARAM_NAME, &name.to_string())
            .with_value(PARAM_PROGRAM_HASH, &counter_contract().program_hash());
        let req = vm.request(sender, NAME, FUNC_DEPLOY_CONTRACT, params);
        vm.run_one(req)
    }

    fn permission(vm: &mut TestVm, func: &str, deployer: &AgentId) -> RequestReceipt {
        let req = vm.request(
            &OWNER,
            NAME,
            func,
            Dict::new().with_value(PARAM_DEPLOYER, deployer),
        );
        vm.run_one(req)
    }

    fn found(vm: &TestVm, name: &str) -> bool {
        vm.view(NAME, VIEW_FIND_CONTRACT, Dict::new().with_value(PARAM_HNAME, &hn(name)))
            .unwrap()
            .require(PARAM_CONTRACT_FOUND)
            .unwrap()
    }

    fn count(vm: &TestVm) -> u32 {
        contract_count(&partition(&vm.snapshot, hname()))
    }

    // ==================== Storage ====================

    fn record(name: &str) -> ContractRecord {
        ContractRecord::new(name, "", H256::from_bytes([1; 32]), AgentId::Nil)
    }

    #[test]
    fn test_registry() {
        let mut state = StateSnapshot::new();
        assert!(find_contract(&state, hn("a")).is_none());
        register_contract(&mut state, &record("a"));
        register_contract(&mut state, &record("b"));

        assert_eq!(find_contract(&state, hn("a")), Some(record("a")));
        assert_eq!(contract_count(&state), 2);
        let names: Vec<String> = contract_records(&state).into_iter().map(|r| r.name).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"b".to_string()));
    }

    #[test]
    fn test_permissions_default() {
        let state = StateSnapshot::new();
        assert!(deploy_permissions_enabled(&state));
        assert!(!has_deploy_permission(&state, &AgentId::Nil));
    }

    // ==================== Deployment ====================

    #[test]
    fn test_unauthorized_deploy() {
        let mut vm = TestVm::new();
        let receipt = deploy(&mut vm, &agent(1), "counter", Dict::new());
        assert_eq!(code(&receipt), Some(VmErrorCode::Unauthorized));
        assert_eq!(count(&vm), 5);
        assert!(!found(&vm, "counter"));
    }

    #[test]
    fn test_grant_and_revoke() {
        let mut vm = TestVm::new();
        assert!(permission(&mut vm, FUNC_GRANT_DEPLOY_PERMISSION, &agent(1)).is_success());
        assert!(deploy(&mut vm, &agent(1), "c1", Dict::new()).is_success());
        let record = find_contract(&partition(&vm.snapshot, hname()), hn("c1")).unwrap();
        assert_eq!(record.creator, agent(1));

        assert!(permission(&mut vm, FUNC_REVOKE_DEPLOY_PERMISSION, &agent(1)).is_success());
        let receipt = deploy(&mut vm, &agent(1), "c2", Dict::new());
        assert_eq!(code(&receipt), Some(VmErrorCode::Unauthorized));
        assert_eq!(count(&vm), 6);
    }

    #[test]
    fn test_only_owner_grants() {
        let mut vm = TestVm::new();
        let req = vm.request(
            &agent(1),
            NAME,
            FUNC_GRANT_DEPLOY_PERMISSION,
            Dict::new().with_value(PARAM_DEPLOYER, &agent(1)),
        );
        assert_eq!(code(&vm.run_one(req)), Some(VmErrorCode::Unauthorized));
        assert!(!has_deploy_permission(&partition(&vm.snapshot, hname()), &agent(1)));
    }

    #[test]
    fn test_permissions_disabled() {
        let mut vm = TestVm::new();
        let req = vm.request(
            &OWNER,
            NAME,
            FUNC_REQUIRE_DEPLOY_PERMISSIONS,
            Dict::new().with_value(PARAM_DEPLOY_PERMISSIONS_ENABLED, &false),
        );
        assert!(vm.run_one(req).is_success());
        assert!(deploy(&mut vm, &agent(2), "open", Dict::new()).is_success());
        assert!(found(&vm, "open"));
    }

    #[test]
    fn test_failed_constructor_rolls_back() {
        let mut vm = TestVm::new();
        let receipt = deploy(&mut vm, &OWNER, "counter", Dict::new().with_value("fail", &true));
        assert_eq!(code(&receipt), Some(VmErrorCode::Generic));
        assert!(receipt.events.is_empty());
        assert!(!found(&vm, "counter"));
        assert_eq!(count(&vm), 5);
    }

    #[test]
    fn test_deploy_twice() {
        let mut vm = TestVm::new();
        assert!(vm.deploy_counter(Dict::new()).is_success());
        let receipt = vm.deploy_counter(Dict::new());
        assert_eq!(code(&receipt), Some(VmErrorCode::AlreadyExists));
        assert_eq!(count(&vm), 6);
    }

    #[test]
    fn test_deploy_unknown_program() {
        let mut vm = TestVm::new();
        let params = Dict::new()
            .with_value(PARAM_NAME, &"ghost".to_string())
            .with_value(PARAM_PROGRAM_HASH, &H256::from_bytes([7; 32]));
        let req = vm.request(&OWNER, NAME, FUNC_DEPLOY_CONTRACT, params);
        assert_eq!(code(&vm.run_one(req)), Some(VmErrorCode::NotFound));
        assert!(!found(&vm, "ghost"));
    }

    #[test]
    fn test_contract_records_view() {
        let mut vm = TestVm::new();
        vm.deploy_counter(Dict::new());
        let out = vm.view(NAME, VIEW_GET_CONTRACT_RECORDS, Dict::new()).unwrap();
        let records: Vec<ContractRecord> =
            codec::decode_list(out.get(PARAM_CONTRACT_REGISTRY).unwrap()).unwrap();
        assert_eq!(records.len(), 6);
        assert!(records.iter().any(|r| r.name == "counter" && r.creator == OWNER));
    }
}
