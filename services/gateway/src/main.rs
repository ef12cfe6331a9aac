//! Dispatcher entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use trader_config::{resolve_config_path, AppConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path; defaults to $DISPATCHER_CONFIG or config/dispatcher.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let path = args.config.unwrap_or_else(resolve_config_path);

    let config = AppConfig::load(&path)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {path:?}"))?;
    gateway::logging::init(&config)?;

    info!("Starting signal dispatcher");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        symbols = ?config.klines.symbols,
        simulated = config.simulated,
        copytrade = config.copytrade.enabled,
        "Configuration loaded from {:?}",
        path
    );

    gateway::run(config).await
}
