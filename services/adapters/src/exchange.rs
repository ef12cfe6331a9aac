//! Uniform capability set over the derivatives exchange

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use types::{Kline, MarginMode, OrderRequest, PositionInfo, PositionSide, TimePeriod, TradeType};

use crate::Result;

/// Candle query for [`Exchange::kline_records`]
#[derive(Debug, Clone, PartialEq)]
pub struct KlineQuery {
    pub symbol: String,
    pub period: TimePeriod,
    pub limit: usize,
    /// Only candles newer than this instant
    pub since: Option<DateTime<Utc>>,
    pub trade_type: TradeType,
    /// Ascending by time when true; venue order otherwise
    pub sorted: bool,
}

impl KlineQuery {
    pub fn latest(symbol: impl Into<String>, period: TimePeriod, limit: usize) -> Self {
        Self {
            symbol: symbol.into(),
            period,
            limit,
            since: None,
            trade_type: TradeType::Swap,
            sorted: true,
        }
    }
}

/// Both sides of a symbol's derivatives position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionPair {
    pub long: Option<PositionInfo>,
    pub short: Option<PositionInfo>,
}

impl PositionPair {
    pub fn is_flat(&self) -> bool {
        self.long.is_none() && self.short.is_none()
    }

    pub fn get(&self, side: PositionSide) -> Option<&PositionInfo> {
        match side {
            PositionSide::Long => self.long.as_ref(),
            PositionSide::Short => self.short.as_ref(),
        }
    }

    /// The held position; long wins when both sides are open
    pub fn primary(&self) -> Option<&PositionInfo> {
        self.long.as_ref().or(self.short.as_ref())
    }

    pub fn insert(&mut self, position: PositionInfo) {
        match position.direction {
            PositionSide::Long => self.long = Some(position),
            PositionSide::Short => self.short = Some(position),
        }
    }
}

/// Market order that reduces an open position
#[derive(Debug, Clone, PartialEq)]
pub struct ClosePosition {
    pub symbol: String,
    pub direction: PositionSide,
    /// Contracts to close
    pub amount: Decimal,
    pub margin_mode: MarginMode,
    pub trade_type: TradeType,
}

impl ClosePosition {
    /// Close all of `position`
    pub fn full(position: &PositionInfo, trade_type: TradeType) -> Self {
        Self {
            symbol: position.symbol.clone(),
            direction: position.direction,
            amount: position.amount,
            margin_mode: position.margin_mode,
            trade_type,
        }
    }
}

/// Exchange verbs consumed by the K-line manager and the position service
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Venue name for logging
    fn name(&self) -> &'static str;

    async fn last_price(&self, symbol: &str) -> Result<Decimal>;

    /// Closed candles only; the still-forming candle is dropped
    async fn kline_records(&self, query: &KlineQuery) -> Result<Vec<Kline>>;

    async fn position(&self, symbol: &str, trade_type: TradeType) -> Result<PositionPair>;

    /// Submit an order, returning the venue order id
    async fn place_order(&self, order: &OrderRequest) -> Result<String>;

    /// Market order on the opposite side with `posSide = direction`
    async fn close_position(&self, request: &ClosePosition) -> Result<String>;

    async fn set_leverage(
        &self,
        symbol: &str,
        leverage: u32,
        margin_mode: MarginMode,
        position_side: PositionSide,
    ) -> Result<()>;

    /// Available balance of `currency` in the trading account
    async fn available_balance(&self, currency: &str) -> Result<Decimal>;

    /// Base units per contract; 1 for spot
    async fn contract_multiplier(&self, symbol: &str, trade_type: TradeType) -> Result<Decimal>;

    /// Move the stop-loss attached to the position on `position_side`
    async fn amend_stop_loss(
        &self,
        symbol: &str,
        trade_type: TradeType,
        position_side: PositionSide,
        stop_loss: Decimal,
    ) -> Result<()>;
}
