//! Chain state bootstrap

use crate::config::ChainConfig;
use crate::error::NodeResult;
use isc_storage::{BufferedKv, Database, StateDb, StateSnapshot};
use isc_vm::core::{self as corecontracts, blocklog};
use isc_vm::init_chain;

/// Where committed chain state lives
pub enum StateStore {
    /// Nothing survives a restart
    Memory,
    /// RocksDB under the data directory
    Persistent(StateDb),
}

impl StateStore {
    /// Open the store selected by `config`
    pub fn open(config: &ChainConfig) -> NodeResult<Self> {
        if !config.persistent {
            return Ok(Self::Memory);
        }
        std::fs::create_dir_all(&config.data_dir)?;
        let db = Database::new(config.data_dir.join("db"));
        db.open()?;
        Ok(Self::Persistent(StateDb::new(db)))
    }

    /// Committed state; empty for a fresh store
    pub fn load(&self) -> NodeResult<StateSnapshot> {
        match self {
            Self::Memory => Ok(StateSnapshot::new()),
            Self::Persistent(db) => Ok(db.load_snapshot()?),
        }
    }

    /// Persist the mutations of a block
    pub fn commit(&self, mutations: &isc_storage::Mutations, block_index: u32) -> NodeResult<()> {
        if let Self::Persistent(db) = self {
            db.commit(mutations, block_index)?;
        }
        Ok(())
    }
}

/// Load the chain state, writing block 0 first if the store is empty
pub fn load_or_init(store: &StateStore, config: &ChainConfig) -> NodeResult<StateSnapshot> {
    let snapshot = store.load()?;
    let blocks = corecontracts::partition(&snapshot, blocklog::hname());
    if let Some(index) = blocklog::latest_block_index(&blocks) {
        tracing::info!(block_index = index, keys = snapshot.len(), "chain state loaded");
        return Ok(snapshot);
    }

    tracing::info!(chain_id = %config.chain_id(), "initializing chain state");
    let mut state = BufferedKv::new(snapshot);
    init_chain(&mut state, &config.genesis(), &corecontracts::core_contracts())?;
    let mutations = state.commit();
    store.commit(&mutations, 0)?;
    let (snapshot, _) = state.into_parts();
    Ok(snapshot)
}
