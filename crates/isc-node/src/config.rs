//! Chain runner configuration

use crate::error::{NodeError, NodeResult};
use isc_mempool::PoolConfig;
use isc_types::{Address, AgentId, Assets, ChainId, Timestamp, H256};
use isc_vm::{ChainGenesis, GasFeePolicy, GasLimits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Chain configuration, usually read from a JSON file.
///
/// Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain ID, hex
    pub chain_id: H256,
    /// Initial chain owner
    pub owner: Address,
    /// Data directory
    pub data_dir: PathBuf,
    /// Keep state in RocksDB under `data_dir`
    pub persistent: bool,
    /// Fallback tick of the batch proposer, in milliseconds
    pub batch_interval_ms: u64,
    /// Maximum requests per batch
    pub max_batch_size: usize,
    /// Maximum pooled requests
    pub max_pool_size: usize,
    /// Capacity of the inbound request channel
    pub inbound_capacity: usize,
    /// Start of the logical clock
    pub start_time: Timestamp,
    /// Gas limits written at genesis
    pub gas_limits: GasLimits,
    /// Gas fee policy written at genesis
    pub fee_policy: GasFeePolicy,
    /// Initial base token balances
    pub allocations: Vec<Allocation>,
    /// Verify the account ledger after every batch
    pub check_ledger: bool,
}

/// Initial balance of an L1 address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Account owner
    pub address: Address,
    /// Base tokens
    pub base_tokens: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: H256::from_bytes([1; 32]),
            owner: Address::ZERO,
            data_dir: PathBuf::from("./data"),
            persistent: false,
            batch_interval_ms: 1_000,
            max_batch_size: 100,
            max_pool_size: 10_000,
            inbound_capacity: 1_024,
            start_time: 0,
            gas_limits: GasLimits::default(),
            fee_policy: GasFeePolicy::default(),
            allocations: Vec::new(),
            check_ledger: true,
        }
    }
}

impl ChainConfig {
    /// Read a config file
    pub fn load(path: &Path) -> NodeResult<Self> {
        tracing::info!(path = %path.display(), "loading chain config");
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runner cannot work with
    pub fn validate(&self) -> NodeResult<()> {
        if self.max_batch_size == 0 || self.max_batch_size > usize::from(u16::MAX) {
            return Err(NodeError::Config(format!(
                "max_batch_size must be in 1..={}",
                u16::MAX
            )));
        }
        if self.inbound_capacity == 0 {
            return Err(NodeError::Config("inbound_capacity must be positive".into()));
        }
        if self.batch_interval_ms == 0 {
            return Err(NodeError::Config("batch_interval_ms must be positive".into()));
        }
        if self.gas_limits.min_gas_per_request > self.gas_limits.max_gas_per_request {
            return Err(NodeError::Config(
                "min_gas_per_request exceeds max_gas_per_request".into(),
            ));
        }
        Ok(())
    }

    /// Chain ID
    pub fn chain_id(&self) -> ChainId {
        ChainId(self.chain_id)
    }

    /// Fallback tick of the batch proposer
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    /// Pool settings
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.max_pool_size,
            max_batch_size: self.max_batch_size,
        }
    }

    /// Block 0 settings
    pub fn genesis(&self) -> ChainGenesis {
        let mut genesis = ChainGenesis::new(self.chain_id(), AgentId::Address(self.owner))
            .with_gas_limits(self.gas_limits)
            .with_fee_policy(self.fee_policy);
        genesis.timestamp = self.start_time;
        for alloc in &self.allocations {
            genesis = genesis.with_allocation(
                AgentId::Address(alloc.address),
                Assets::from_base_tokens(alloc.base_tokens),
            );
        }
        genesis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ChainConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ChainConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        let json = r#"{
            "chain_id": "0x0202020202020202020202020202020202020202020202020202020202020202",
            "owner": "0x0909090909090909090909090909090909090909",
            "max_batch_size": 10,
            "fee_policy": { "gas_per_token": [100, 1], "validator_fee_share": 10 },
            "allocations": [
                { "address": "0x0101010101010101010101010101010101010101", "base_tokens": 500 }
            ]
        }"#;
        file.write_all(json.as_bytes()).unwrap();

        let config = ChainConfig::load(file.path()).unwrap();
        assert_eq!(config.chain_id(), ChainId::from_bytes([2; 32]));
        assert_eq!(config.owner, Address::from_bytes([9; 20]));
        assert_eq!(config.pool_config().max_batch_size, 10);
        assert_eq!(config.fee_policy.validator_fee_share, 10);
        assert_eq!(config.gas_limits, GasLimits::default());

        let genesis = config.genesis();
        assert_eq!(genesis.owner, AgentId::Address(Address::from_bytes([9; 20])));
        assert_eq!(genesis.allocations.len(), 1);
        assert_eq!(genesis.allocations[0].1.base_tokens, 500);
    }

    #[test]
    fn test_invalid_config() {
        let config = ChainConfig {
            max_batch_size: 0,
            ..ChainConfig::default()
        };
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{ "chain_id": "0x12" }"#).unwrap();
        assert!(matches!(ChainConfig::load(file.path()), Err(NodeError::Json(_))));
    }
}
