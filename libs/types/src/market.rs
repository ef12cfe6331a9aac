//! Candles and the timeframes they are aggregated on

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;

/// One closed OHLCV candle. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
}

/// Candle timeframe tracked by the K-line manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimePeriod {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
}

impl TimePeriod {
    /// All tracked periods, shortest first
    pub const ALL: [TimePeriod; 4] = [
        TimePeriod::M15,
        TimePeriod::M30,
        TimePeriod::H1,
        TimePeriod::H4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::M15 => "15m",
            TimePeriod::M30 => "30m",
            TimePeriod::H1 => "1h",
            TimePeriod::H4 => "4h",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            TimePeriod::M15 => 15,
            TimePeriod::M30 => 30,
            TimePeriod::H1 => 60,
            TimePeriod::H4 => 240,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }

    /// Bar identifier understood by the OKX candles endpoint
    pub fn okx_bar(&self) -> &'static str {
        match self {
            TimePeriod::M15 => "15m",
            TimePeriod::M30 => "30m",
            TimePeriod::H1 => "1H",
            TimePeriod::H4 => "4H",
        }
    }

    /// Whether a refresh tick at wall-clock `hour:minute` follows the close
    /// of a candle of this period. Ticks only happen on 15-minute boundaries.
    pub fn closes_at(&self, hour: u32, minute: u32) -> bool {
        match self {
            TimePeriod::M15 => true,
            TimePeriod::M30 => minute % 30 == 0,
            TimePeriod::H1 => minute == 0,
            TimePeriod::H4 => hour % 4 == 0 && minute == 0,
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimePeriod {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "15m" => Ok(TimePeriod::M15),
            "30m" => Ok(TimePeriod::M30),
            "1h" => Ok(TimePeriod::H1),
            "4h" => Ok(TimePeriod::H4),
            _ => Err(TypeError::unknown("time period", s)),
        }
    }
}
