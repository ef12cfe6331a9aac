//! Order-side enums, order requests and persisted order records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;

/// Direction of a signal or order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
    Hold,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
            Side::Hold => "hold",
        }
    }

    /// Opposite trading direction. `Hold` has none.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
            Side::Hold => Side::Hold,
        }
    }

    /// Position opened by an order of this side
    pub fn position_side(&self) -> Option<PositionSide> {
        match self {
            Side::Buy => Some(PositionSide::Long),
            Side::Sell => Some(PositionSide::Short),
            Side::Hold => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" | "b" | "long" => Ok(Side::Buy),
            "sell" | "s" | "short" => Ok(Side::Sell),
            "hold" => Ok(Side::Hold),
            _ => Err(TypeError::unknown("side", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

impl FromStr for OrderType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            _ => Err(TypeError::unknown("order type", s)),
        }
    }
}

/// Governs which instrument and position concept applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Spot,
    #[default]
    Swap,
    Futures,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Spot => "spot",
            TradeType::Swap => "swap",
            TradeType::Futures => "futures",
        }
    }
}

impl FromStr for TradeType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(TradeType::Spot),
            "swap" => Ok(TradeType::Swap),
            "futures" => Ok(TradeType::Futures),
            _ => Err(TypeError::unknown("trade type", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    #[default]
    Cross,
    Isolated,
}

impl MarginMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginMode::Cross => "cross",
            MarginMode::Isolated => "isolated",
        }
    }
}

impl FromStr for MarginMode {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cross" => Ok(MarginMode::Cross),
            "isolated" => Ok(MarginMode::Isolated),
            _ => Err(TypeError::unknown("margin mode", s)),
        }
    }
}

/// Held direction of a derivatives position; distinct from order [`Side`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }

    /// Order side that opens or adds to this position
    pub fn opening_side(&self) -> Side {
        match self {
            PositionSide::Long => Side::Buy,
            PositionSide::Short => Side::Sell,
        }
    }

    /// Order side that reduces this position
    pub fn closing_side(&self) -> Side {
        self.opening_side().opposite()
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionSide {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" => Ok(PositionSide::Long),
            "short" => Ok(PositionSide::Short),
            _ => Err(TypeError::unknown("position side", s)),
        }
    }
}

/// Order handed to the exchange adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Canonical `BASE/QUOTE` pair
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub trade_type: TradeType,
    /// Zero for market orders
    pub price: Decimal,
    /// Size in contracts (swap/futures) or base units (spot)
    pub size: Decimal,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub margin_mode: MarginMode,
    pub position_side: PositionSide,
    pub leverage: u32,
    pub reduce_only: bool,
}

/// One executed order as persisted in `order_records`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Store-assigned row id, `None` until persisted
    pub id: Option<i64>,
    pub order_id: String,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub tp: Option<Decimal>,
    pub sl: Option<Decimal>,
    pub strategy: String,
    pub comment: String,
    pub trade_type: TradeType,
    pub mgn_mode: MarginMode,
    pub leverage: u32,
    /// Signal time that triggered the order
    pub timestamp: DateTime<Utc>,
    pub level: u8,
    pub score: f64,
}
