//! Computed trend state per symbol

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::market::TimePeriod;
use crate::trading::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
    #[default]
    Unknown,
    Reversal,
}

impl TrendDirection {
    /// `Up` matches buys, `Down` matches sells; nothing else matches
    pub fn matches_side(&self, side: Side) -> bool {
        matches!(
            (self, side),
            (TrendDirection::Up, Side::Buy) | (TrendDirection::Down, Side::Sell)
        )
    }

    /// True when the direction positively opposes `side`
    pub fn contradicts_side(&self, side: Side) -> bool {
        matches!(
            (self, side),
            (TrendDirection::Up, Side::Sell) | (TrendDirection::Down, Side::Buy)
        )
    }
}

/// Snapshot published by the trend manager; replaced atomically on refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendState {
    pub symbol: String,
    pub direction: TrendDirection,
    /// Weighted score in `[-3, +3]`
    pub score: f64,
    pub strong_short_tf: bool,
    pub last_price: f64,
    pub timestamp: DateTime<Utc>,
    /// Sub-score of every period that had enough history
    pub period_scores: BTreeMap<TimePeriod, f64>,
    /// Change of the 30m sub-score over its latest bar
    pub slope_30m: f64,
    pub adx_15m: Option<f64>,
}

impl TrendState {
    /// State for a symbol without enough history
    pub fn unknown(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            direction: TrendDirection::Unknown,
            score: 0.0,
            strong_short_tf: false,
            last_price: 0.0,
            timestamp,
            period_scores: BTreeMap::new(),
            slope_30m: 0.0,
            adx_15m: None,
        }
    }

    pub fn period_score(&self, period: TimePeriod) -> Option<f64> {
        self.period_scores.get(&period).copied()
    }
}
