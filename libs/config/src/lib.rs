//! Dispatcher Configuration
//!
//! Loads the YAML configuration file and layers `DISPATCHER__*` environment
//! variables on top (`DISPATCHER__WEBHOOK__SECRET` overrides
//! `webhook.secret`).

mod app;
mod strategy;

pub use app::{
    AppConfig, CopyTradeConfig, DatabaseConfig, KlineConfig, LoggingConfig, OkxConfig,
    WebhookConfig,
};
pub use strategy::StrategyConfig;

use anyhow::Result;
use std::path::PathBuf;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "DISPATCHER_CONFIG";

/// Used when `DISPATCHER_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/dispatcher.yaml";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "DISPATCHER";

pub fn resolve_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load and validate the configuration named by the environment
pub fn load_config() -> Result<AppConfig> {
    let config = AppConfig::load(&resolve_config_path())?;
    config.validate()?;
    Ok(config)
}
