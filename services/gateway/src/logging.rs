//! Tracing subscriber setup

use anyhow::{anyhow, Result};
use trader_config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directives when `RUST_LOG` is unset
pub fn default_directives(config: &AppConfig) -> String {
    let mut directives = config.logging.level.clone();
    if config.strategy.enable_debug_log {
        directives.push_str(",strategies=debug");
    }
    directives
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(config)))
        .map_err(|e| anyhow!("invalid log filter: {e}"))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "webhook:\n  secret: \"k\"\n";

    #[test]
    fn test_debug_log_raises_strategy_level() {
        let config = AppConfig::from_yaml_str(BASE).unwrap();
        assert_eq!(default_directives(&config), "info");

        let yaml = format!("{BASE}strategy:\n  enableDebugLog: true\nlogging:\n  level: warn\n");
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(default_directives(&config), "warn,strategies=debug");
    }
}
