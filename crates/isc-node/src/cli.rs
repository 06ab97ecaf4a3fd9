//! CLI argument parsing for isc-node

use crate::config::ChainConfig;
use clap::Parser;
use isc_types::{Address, H256};
use std::path::PathBuf;

/// ISC chain node
#[derive(Parser, Debug, Clone)]
#[command(name = "isc-node")]
#[command(about = "ISC chain runner")]
#[command(version)]
pub struct Cli {
    /// Chain config file (JSON); defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Data directory, overrides the config file
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Keep chain state in RocksDB under the data directory
    #[arg(long)]
    pub persistent: bool,

    /// Chain ID (32 bytes, hex)
    #[arg(long)]
    pub chain_id: Option<H256>,

    /// Initial chain owner (L1 address, hex)
    #[arg(long)]
    pub owner: Option<Address>,

    /// Fallback tick of the batch proposer in milliseconds
    #[arg(long)]
    pub batch_interval_ms: Option<u64>,

    /// Maximum requests per batch
    #[arg(long)]
    pub max_batch_size: Option<usize>,

    /// Skip the account ledger check after each batch
    #[arg(long)]
    pub no_ledger_check: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Apply the flags given on the command line on top of `config`
    pub fn apply(&self, config: &mut ChainConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if self.persistent {
            config.persistent = true;
        }
        if let Some(id) = self.chain_id {
            config.chain_id = id;
        }
        if let Some(owner) = self.owner {
            config.owner = owner;
        }
        if let Some(ms) = self.batch_interval_ms {
            config.batch_interval_ms = ms;
        }
        if let Some(n) = self.max_batch_size {
            config.max_batch_size = n;
        }
        if self.no_ledger_check {
            config.check_ledger = false;
        }
    }
}
