//! Interface between contract code and the VM

use crate::gas::BurnCode;
use isc_storage::{SubRealm, SubRealmReader};
use isc_types::{
    Address, AgentId, Assets, ChainId, Dict, Hname, RequestId, Timestamp, VmError, H256,
};

/// Everything a contract can see and do during a call.
///
/// State access is confined to the calling contract's own partition. Funds
/// move only through the allowance granted by the caller.
pub trait Sandbox {
    /// Chain the contract runs on
    fn chain_id(&self) -> ChainId;

    /// Hname of the running contract
    fn contract(&self) -> Hname;

    /// Agent of the running contract
    fn contract_agent_id(&self) -> AgentId {
        AgentId::contract(self.chain_id(), self.contract())
    }

    /// Caller: the request sender or the calling contract
    fn caller(&self) -> AgentId;

    /// Request being processed; `None` for views called from outside
    fn request_id(&self) -> Option<RequestId>;

    /// Call parameters
    fn params(&self) -> &Dict;

    /// Logical time of the batch
    fn timestamp(&self) -> Timestamp;

    /// Per-request entropy
    fn entropy(&self) -> H256;

    /// Current chain owner
    fn chain_owner(&self) -> AgentId;

    /// Fee for the minimum gas of a request, in base tokens
    fn min_request_fee(&self) -> u64;

    /// Whether the call runs read-only
    fn is_view(&self) -> bool;

    /// Contract state, writable
    fn state(&mut self) -> SubRealm<'_>;

    /// Contract state, read-only
    fn state_reader(&self) -> SubRealmReader<'_>;

    /// What the caller still allows this contract to take
    fn allowance(&self) -> &Assets;

    /// Assets attached to the request, already credited to the sender
    fn incoming(&self) -> &Assets;

    /// On-chain balance of an account
    fn balance(&self, agent: &AgentId) -> Assets;

    /// Move `assets` (all remaining allowance if `None`) from the caller's
    /// account to `target`, consuming allowance
    fn transfer_allowed_funds(
        &mut self,
        target: &AgentId,
        assets: Option<&Assets>,
    ) -> Result<Assets, VmError>;

    /// Burn gas
    fn burn_gas(&mut self, code: BurnCode, units: u64) -> Result<(), VmError>;

    /// Emit an event
    fn event(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), VmError>;

    /// Call another contract, granting it `allowance` from this contract's
    /// account
    fn call(
        &mut self,
        contract: Hname,
        entry_point: Hname,
        params: Dict,
        allowance: Assets,
    ) -> Result<Dict, VmError>;

    /// Call a view of another contract
    fn call_view(&mut self, contract: Hname, entry_point: Hname, params: Dict)
        -> Result<Dict, VmError>;

    /// Log a message attributed to the contract
    fn log(&self, msg: &str);

    /// Send assets held by the running contract's account to an L1 address.
    /// Only the accounts contract may do this.
    fn send_to_l1(&mut self, target: Address, assets: &Assets) -> Result<(), VmError>;

    /// Make sure the processor of `program_hash` can be loaded.
    /// Only the root contract may do this.
    fn load_program(&mut self, program_hash: &H256) -> Result<(), VmError>;

    /// Fail unless the caller is `agent`
    fn require_caller(&self, agent: &AgentId) -> Result<(), VmError> {
        if self.caller() == *agent {
            Ok(())
        } else {
            Err(VmError::unauthorized(format!(
                "caller {} is not {}",
                self.caller(),
                agent
            )))
        }
    }

    /// Fail unless the caller is the chain owner
    fn require_chain_owner(&self) -> Result<(), VmError> {
        self.require_caller(&self.chain_owner())
    }
}
