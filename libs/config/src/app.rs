//! Top-level configuration sections

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use types::MarginMode;

use crate::strategy::StrategyConfig;
use crate::ENV_PREFIX;

// Some config sources lowercase keys, hence the lowercase aliases on
// camelCase fields throughout this crate.

/// Full process configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub okx: OkxConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Sends the sandbox header on every exchange request
    #[serde(default)]
    pub simulated: bool,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub klines: KlineConfig,
    #[serde(default)]
    pub copytrade: CopyTradeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Shared HMAC secret for `X-Signature`
    pub secret: String,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxConfig {
    #[serde(default, alias = "apikey")]
    pub api_key: String,
    #[serde(default, alias = "secretkey")]
    pub secret_key: String,
    /// API passphrase
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_okx_url", alias = "baseurl")]
    pub base_url: String,
    /// Margin mode for new swap and futures positions
    #[serde(default, alias = "marginmode")]
    pub margin_mode: MarginMode,
}

fn default_okx_url() -> String {
    "https://www.okx.com".to_string()
}

impl Default for OkxConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            password: String::new(),
            base_url: default_okx_url(),
            margin_mode: MarginMode::Cross,
        }
    }
}

/// Order-record storage. Only `path` is used locally; the server fields
/// describe an external relational store.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub dbname: String,
    /// SQLite file for order records; in-memory store when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KlineConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Window length per `(symbol, period)`
    #[serde(default = "default_kline_limit")]
    pub limit: usize,
    /// Fetch attempts per window during the startup backfill
    #[serde(default = "default_backfill_attempts")]
    pub backfill_attempts: u32,
    #[serde(default = "default_backfill_retry_ms")]
    pub backfill_retry_ms: u64,
}

fn default_symbols() -> Vec<String> {
    vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()]
}

fn default_kline_limit() -> usize {
    300
}

fn default_backfill_attempts() -> u32 {
    3
}

fn default_backfill_retry_ms() -> u64 {
    2000
}

impl Default for KlineConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            limit: default_kline_limit(),
            backfill_attempts: default_backfill_attempts(),
            backfill_retry_ms: default_backfill_retry_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyTradeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Tracked wallet address
    #[serde(default)]
    pub address: String,
    #[serde(default, alias = "allowedcoins")]
    pub allowed_coins: Vec<String>,
    #[serde(default = "default_ws_url", alias = "wsurl")]
    pub ws_url: String,
    #[serde(default = "default_info_url", alias = "infourl")]
    pub info_url: String,
    /// Interval between account-state polls
    #[serde(default = "default_poll_secs", alias = "pollsecs")]
    pub poll_secs: u64,
    #[serde(default = "default_leverage", alias = "defaultleverage")]
    pub default_leverage: u32,
    /// Strategy the synthesized signals are dispatched to
    #[serde(default = "default_copy_strategy")]
    pub strategy: String,
}

fn default_ws_url() -> String {
    "wss://api.hyperliquid.xyz/ws".to_string()
}

fn default_info_url() -> String {
    "https://api.hyperliquid.xyz/info".to_string()
}

fn default_poll_secs() -> u64 {
    30
}

fn default_leverage() -> u32 {
    20
}

fn default_copy_strategy() -> String {
    "hype-copy".to_string()
}

impl Default for CopyTradeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: String::new(),
            allowed_coins: Vec::new(),
            ws_url: default_ws_url(),
            info_url: default_info_url(),
            poll_secs: default_poll_secs(),
            default_leverage: default_leverage(),
            strategy: default_copy_strategy(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load from a YAML file with environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from {:?}", path);

        let config = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml).required(true))
            .add_source(env_overrides())
            .build()
            .with_context(|| format!("Failed to build configuration from {:?}", path))?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Parse YAML text directly, without environment overrides
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .context("Failed to parse configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Reject settings the dispatcher cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.webhook.secret.trim().is_empty() {
            bail!("webhook.secret must be set");
        }
        if self.klines.symbols.is_empty() {
            bail!("klines.symbols must list at least one symbol");
        }
        if self.klines.backfill_attempts == 0 {
            bail!("klines.backfill_attempts must be at least 1");
        }
        if !(210..=300).contains(&self.klines.limit) {
            bail!(
                "klines.limit must be within 210..=300 to compute trend state, got {}",
                self.klines.limit
            );
        }
        if self.copytrade.enabled && self.copytrade.address.trim().is_empty() {
            bail!("copytrade.address is required when copytrade is enabled");
        }
        self.strategy.validate()
    }

    pub fn webhook_addr(&self) -> String {
        format!("{}:{}", self.webhook.bind, self.webhook.port)
    }
}

fn env_overrides() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
