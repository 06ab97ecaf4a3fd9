//! Chain initialization: block 0

use crate::core::accounts::ledger;
use crate::core::{self as corecontracts, accounts, blocklog, governance, root};
use crate::error::{RunError, RunResult};
use crate::gas::{GasFeePolicy, GasLimits};
use crate::processors::ContractInterface;
use isc_storage::KvWriter;
use isc_types::{AgentId, Assets, BlockInfo, ChainId, ContractRecord, Timestamp};
use tracing::{debug, info};

/// Initial chain configuration
#[derive(Clone, Debug)]
pub struct ChainGenesis {
    /// Chain ID
    pub chain_id: ChainId,
    /// Initial chain owner
    pub owner: AgentId,
    /// Gas limits
    pub gas_limits: GasLimits,
    /// Gas fee policy
    pub fee_policy: GasFeePolicy,
    /// Initial balances
    pub allocations: Vec<(AgentId, Assets)>,
    /// Timestamp of block 0
    pub timestamp: Timestamp,
}

impl ChainGenesis {
    /// Genesis with default gas settings and no allocations
    pub fn new(chain_id: ChainId, owner: AgentId) -> Self {
        Self {
            chain_id,
            owner,
            gas_limits: GasLimits::default(),
            fee_policy: GasFeePolicy::default(),
            allocations: Vec::new(),
            timestamp: 0,
        }
    }

    /// Add an initial balance
    pub fn with_allocation(mut self, agent: AgentId, assets: Assets) -> Self {
        self.allocations.push((agent, assets));
        self
    }

    /// Set the gas fee policy
    pub fn with_fee_policy(mut self, policy: GasFeePolicy) -> Self {
        self.fee_policy = policy;
        self
    }

    /// Set the gas limits
    pub fn with_gas_limits(mut self, limits: GasLimits) -> Self {
        self.gas_limits = limits;
        self
    }
}

/// Write block 0 into `state`, registering `contracts` in order without any
/// permission check. Fails if the state already holds a block.
pub fn init_chain(
    state: &mut dyn KvWriter,
    genesis: &ChainGenesis,
    contracts: &[ContractInterface],
) -> RunResult<()> {
    if blocklog::latest_block_index(&corecontracts::partition(&state, blocklog::hname())).is_some()
    {
        return Err(RunError::InvalidState("chain already initialized".into()));
    }

    let mut registry = corecontracts::partition_mut(&mut *state, root::hname());
    for iface in contracts {
        let record = ContractRecord::new(
            iface.name(),
            iface.description(),
            iface.program_hash(),
            AgentId::Nil,
        );
        root::register_contract(&mut registry, &record);
        debug!(contract = iface.name(), hname = %iface.hname(), "registered genesis contract");
    }
    drop(registry);

    governance::init(
        &mut corecontracts::partition_mut(&mut *state, governance::hname()),
        &genesis.owner,
        &genesis.fee_policy,
        &genesis.gas_limits,
    );

    let mut acc = corecontracts::partition_mut(&mut *state, accounts::hname());
    for (agent, assets) in &genesis.allocations {
        ledger::credit(&mut acc, agent, assets);
    }
    ledger::check_ledger(&acc)?;
    drop(acc);

    blocklog::save_block_info(
        &mut corecontracts::partition_mut(state, blocklog::hname()),
        &BlockInfo {
            block_index: 0,
            timestamp: genesis.timestamp,
            ..BlockInfo::default()
        },
    );
    info!(
        chain_id = %genesis.chain_id,
        owner = %genesis.owner,
        contracts = contracts.len(),
        allocations = genesis.allocations.len(),
        "chain initialized"
    );
    Ok(())
}
