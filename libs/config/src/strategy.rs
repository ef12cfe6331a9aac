//! Signal arbitration tuning

use anyhow::{bail, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Tuning keys read by the signal manager. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    /// Minimum gap between two same-side L2 signals
    #[serde(default = "default_spacing_l2", alias = "minspacingl2")]
    pub min_spacing_l2: u64,
    #[serde(default = "default_spacing_l3", alias = "minspacingl3")]
    pub min_spacing_l3: u64,
    #[serde(default, alias = "requirel1confirmforl2open")]
    pub require_l1_confirm_for_l2_open: bool,
    #[serde(default = "default_l1_delay", alias = "l1confirmmaxdelay")]
    pub l1_confirm_max_delay: u64,
    #[serde(default, alias = "requiretrendfilter")]
    pub require_trend_filter: bool,
    /// Counter-trend L3 reduces only beyond this many R of unrealized profit
    #[serde(default = "default_reduce_r", alias = "l3reduceatrmultiple")]
    pub l3_reduce_at_r_multiple: f64,
    /// Fraction of the position shed on an L3 reduce
    #[serde(default = "default_reduce_percent", alias = "l3reducepercent")]
    pub l3_reduce_percent: f64,
    #[serde(default, alias = "enabledebuglog")]
    pub enable_debug_log: bool,
}

fn default_spacing_l2() -> u64 {
    600
}

fn default_spacing_l3() -> u64 {
    300
}

fn default_l1_delay() -> u64 {
    4 * 3600
}

fn default_reduce_r() -> f64 {
    1.0
}

fn default_reduce_percent() -> f64 {
    0.3
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_spacing_l2: default_spacing_l2(),
            min_spacing_l3: default_spacing_l3(),
            require_l1_confirm_for_l2_open: false,
            l1_confirm_max_delay: default_l1_delay(),
            require_trend_filter: false,
            l3_reduce_at_r_multiple: default_reduce_r(),
            l3_reduce_percent: default_reduce_percent(),
            enable_debug_log: false,
        }
    }
}

impl StrategyConfig {
    pub fn min_spacing_l2(&self) -> Duration {
        Duration::seconds(self.min_spacing_l2 as i64)
    }

    pub fn min_spacing_l3(&self) -> Duration {
        Duration::seconds(self.min_spacing_l3 as i64)
    }

    pub fn l1_confirm_max_delay(&self) -> Duration {
        Duration::seconds(self.l1_confirm_max_delay as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.l3_reduce_percent > 0.0 && self.l3_reduce_percent <= 1.0) {
            bail!(
                "strategy.l3ReducePercent must be in (0, 1], got {}",
                self.l3_reduce_percent
            );
        }
        if self.l3_reduce_at_r_multiple < 0.0 {
            bail!("strategy.l3ReduceAtRMultiple must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_accessors() {
        let config = StrategyConfig {
            min_spacing_l2: 30,
            ..Default::default()
        };
        assert_eq!(config.min_spacing_l2(), Duration::seconds(30));
        assert_eq!(config.l1_confirm_max_delay(), Duration::hours(4));
    }

    #[test]
    fn test_reduce_percent_bounds() {
        let mut config = StrategyConfig::default();
        assert!(config.validate().is_ok());
        config.l3_reduce_percent = 0.0;
        assert!(config.validate().is_err());
        config.l3_reduce_percent = 1.5;
        assert!(config.validate().is_err());
    }
}
