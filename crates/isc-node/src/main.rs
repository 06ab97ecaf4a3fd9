//! ISC chain node binary

use anyhow::Result;
use isc_node::cli::Cli;
use isc_node::{Chain, ChainConfig};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut config = match &cli.config {
        Some(path) => ChainConfig::load(path)?,
        None => ChainConfig::default(),
    };
    cli.apply(&mut config);

    tracing::info!(
        chain_id = %config.chain_id(),
        persistent = config.persistent,
        data_dir = %config.data_dir.display(),
        "isc node starting"
    );
    let chain = Arc::new(Chain::open(config)?);

    let stopper = Arc::clone(&chain);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        stopper.stop();
    });

    Arc::clone(&chain).run().await?;

    let metrics = chain.metrics().snapshot().to_json_compact()?;
    tracing::info!(%metrics, "isc node stopped");
    Ok(())
}
