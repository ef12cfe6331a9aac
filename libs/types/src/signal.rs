//! The unit of intake: a trading signal from a webhook, the copy-trade
//! follower or an internal pipeline

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::TypeError;
use crate::trading::{OrderType, Side, TradeType};

/// Semantic priority of a signal
///
/// L1 is long-horizon reference, L2 the primary entry/exit, L3 scale-in and
/// scale-out. The level also fixes how long a signal stays actionable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SignalLevel {
    L1 = 1,
    #[default]
    L2 = 2,
    L3 = 3,
}

impl SignalLevel {
    pub const ALL: [SignalLevel; 3] = [SignalLevel::L1, SignalLevel::L2, SignalLevel::L3];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// How long a signal of this level may still be acted upon
    pub fn lifetime(self) -> Duration {
        match self {
            SignalLevel::L1 => Duration::hours(8),
            SignalLevel::L2 => Duration::hours(3),
            SignalLevel::L3 => Duration::minutes(50),
        }
    }
}

impl TryFrom<u8> for SignalLevel {
    type Error = TypeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SignalLevel::L1),
            2 => Ok(SignalLevel::L2),
            3 => Ok(SignalLevel::L3),
            other => Err(TypeError::InvalidLevel(other)),
        }
    }
}

impl From<SignalLevel> for u8 {
    fn from(level: SignalLevel) -> Self {
        level.as_u8()
    }
}

impl fmt::Display for SignalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.as_u8())
    }
}

/// Trading signal as received on the webhook and produced internally
///
/// Field names follow the webhook JSON body. Optional fields default to
/// zero or empty so that producers may omit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Registry key of the strategy that should handle this signal
    pub strategy: String,
    pub symbol: String,
    pub side: Side,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub trade_type: TradeType,
    #[serde(default)]
    pub level: SignalLevel,
    #[serde(default)]
    pub leverage: u32,
    #[serde(default)]
    pub tp_pct: f64,
    #[serde(default)]
    pub sl_pct: f64,
    #[serde(default)]
    pub score: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Signal {
    /// Minimal signal, mostly useful for internal producers and tests
    pub fn new(
        strategy: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        level: SignalLevel,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            symbol: symbol.into(),
            side,
            price,
            quantity: Decimal::ZERO,
            order_type: OrderType::Market,
            trade_type: TradeType::Swap,
            level,
            leverage: 0,
            tp_pct: 0.0,
            sl_pct: 0.0,
            score: 0.0,
            timestamp,
            comment: String::new(),
            meta: Map::new(),
        }
    }

    /// Instant after which the signal must be discarded
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.timestamp + self.level.lifetime()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Numeric meta value, accepting numbers and numeric strings
    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        match self.meta.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn meta_bool(&self, key: &str) -> bool {
        matches!(self.meta.get(key), Some(Value::Bool(true)))
    }

    /// Conviction in `[0, 1]`: explicit `meta.strength`, else `score / 5`
    pub fn strength(&self) -> f64 {
        self.meta_f64("strength")
            .unwrap_or(self.score / 5.0)
            .clamp(0.0, 1.0)
    }

    /// Copy of this signal re-tagged at another level
    pub fn with_level(&self, level: SignalLevel) -> Self {
        Self {
            level,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn webhook_body() -> &'static str {
        r#"{ "strategy": "tv-level", "symbol": "BTC/USDT", "side": "buy",
             "price": 113990.0, "quantity": 0.01, "order_type": "market",
             "trade_type": "swap", "tp_pct": 0.5, "sl_pct": 0.3,
             "leverage": 20, "score": 4, "level": 1,
             "timestamp": "2025-08-10T21:54:30+08:00", "comment": "breakout" }"#
    }

    #[test]
    fn test_webhook_body_parses() {
        let signal: Signal = serde_json::from_str(webhook_body()).unwrap();
        assert_eq!(signal.strategy, "tv-level");
        assert_eq!(signal.price, dec!(113990));
        assert_eq!(signal.quantity, dec!(0.01));
        assert_eq!(signal.level, SignalLevel::L1);
        assert_eq!(signal.leverage, 20);
        assert_eq!(
            signal.timestamp,
            Utc.with_ymd_and_hms(2025, 8, 10, 13, 54, 30).unwrap()
        );
    }

    #[test]
    fn test_webhook_round_trip_preserves_fields() {
        let signal: Signal = serde_json::from_str(webhook_body()).unwrap();
        let encoded = serde_json::to_string(&signal).unwrap();
        let decoded: Signal = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, signal);
    }

    #[test]
    fn test_invalid_level_rejected() {
        let body = r#"{"strategy":"x","symbol":"BTC/USDT","side":"buy","level":4}"#;
        assert!(serde_json::from_str::<Signal>(body).is_err());
    }

    #[test]
    fn test_expiry_by_level() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let l3 = Signal::new("s", "BTC/USDT", Side::Buy, SignalLevel::L3, dec!(1), t0);
        assert!(!l3.is_expired(t0 + Duration::minutes(50)));
        assert!(l3.is_expired(t0 + Duration::minutes(51)));

        let l1 = l3.with_level(SignalLevel::L1);
        assert!(!l1.is_expired(t0 + Duration::hours(7)));
        assert!(l1.is_expired(t0 + Duration::hours(9)));
    }

    #[test]
    fn test_strength_prefers_meta() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut signal = Signal::new("s", "BTC/USDT", Side::Buy, SignalLevel::L2, dec!(1), t0);
        signal.score = 4.0;
        assert!((signal.strength() - 0.8).abs() < 1e-9);

        signal.meta.insert("strength".into(), Value::from("0.3"));
        assert!((signal.strength() - 0.3).abs() < 1e-9);

        signal.meta.insert("strength".into(), Value::from(7.0));
        assert_eq!(signal.strength(), 1.0);
    }
}
