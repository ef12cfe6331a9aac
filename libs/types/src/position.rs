//! Exchange position snapshots and the local per-level bookkeeping

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::signal::SignalLevel;
use crate::trading::{MarginMode, PositionSide, Side};

/// Read-only mirror of one exchange position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    pub direction: PositionSide,
    /// Size in contracts
    pub amount: Decimal,
    pub avg_price: Decimal,
    pub mark_price: Decimal,
    pub margin: Decimal,
    pub leverage: u32,
    pub margin_mode: MarginMode,
    pub unrealized_pnl: Decimal,
    pub unrealized_return_ratio: f64,
    pub liquidation_price: Option<Decimal>,
    pub open_time: DateTime<Utc>,
}

impl PositionInfo {
    /// Mark-to-entry price move in the position's favour, per unit
    pub fn favourable_move(&self) -> Decimal {
        match self.direction {
            PositionSide::Long => self.mark_price - self.avg_price,
            PositionSide::Short => self.avg_price - self.mark_price,
        }
    }
}

/// Locally tracked entry for one `(symbol, level)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPositionMeta {
    pub symbol: String,
    pub level: SignalLevel,
    pub side: Side,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub open_time: DateTime<Utc>,
}

impl LocalPositionMeta {
    /// Meta reconstructed from an exchange position opened out of band
    pub fn from_position(position: &PositionInfo, level: SignalLevel) -> Self {
        Self {
            symbol: position.symbol.clone(),
            level,
            side: position.direction.opening_side(),
            entry_price: position.avg_price,
            size: position.amount,
            open_time: position.open_time,
        }
    }
}
