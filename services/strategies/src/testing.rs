//! In-memory test doubles
//!
//! [`MockExchange`] implements the full [`Exchange`] verb set against local
//! state. Orders fill immediately at the order price (or the configured last
//! price for market orders) so position queries reflect what was traded.

use adapter_service::{AdapterError, ClosePosition, Exchange, KlineQuery, PositionPair, Result, Venue};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use types::{
    Kline, MarginMode, OrderRequest, PositionInfo, PositionSide, TimePeriod, TradeType,
};

#[derive(Default)]
struct MockState {
    prices: HashMap<String, Decimal>,
    klines: HashMap<(String, TimePeriod), Vec<Kline>>,
    failing_klines: HashSet<(String, TimePeriod)>,
    positions: HashMap<String, PositionPair>,
    multipliers: HashMap<String, Decimal>,
    balance: Decimal,
    orders: Vec<OrderRequest>,
    closes: Vec<ClosePosition>,
    leverage_calls: Vec<(String, u32, MarginMode, PositionSide)>,
    sl_amends: Vec<(String, PositionSide, Decimal)>,
    next_order_id: u64,
    reject_orders: bool,
    manual_fills: bool,
}

pub struct MockExchange {
    state: Mutex<MockState>,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                balance: dec!(10000),
                ..Default::default()
            }),
        }
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.state.lock().prices.insert(symbol.to_string(), price);
    }

    pub fn set_balance(&self, balance: Decimal) {
        self.state.lock().balance = balance;
    }

    pub fn set_multiplier(&self, symbol: &str, multiplier: Decimal) {
        self.state
            .lock()
            .multipliers
            .insert(symbol.to_string(), multiplier);
    }

    pub fn set_klines(&self, symbol: &str, period: TimePeriod, klines: Vec<Kline>) {
        self.state
            .lock()
            .klines
            .insert((symbol.to_string(), period), klines);
    }

    pub fn fail_klines(&self, symbol: &str, period: TimePeriod, fail: bool) {
        let key = (symbol.to_string(), period);
        let mut state = self.state.lock();
        if fail {
            state.failing_klines.insert(key);
        } else {
            state.failing_klines.remove(&key);
        }
    }

    pub fn set_position(&self, position: PositionInfo) {
        self.state
            .lock()
            .positions
            .entry(position.symbol.clone())
            .or_default()
            .insert(position);
    }

    pub fn clear_positions(&self, symbol: &str) {
        self.state.lock().positions.remove(symbol);
    }

    pub fn set_reject_orders(&self, reject: bool) {
        self.state.lock().reject_orders = reject;
    }

    /// Stop orders from changing positions
    pub fn set_manual_fills(&self, manual: bool) {
        self.state.lock().manual_fills = manual;
    }

    pub fn position_pair(&self, symbol: &str) -> PositionPair {
        self.state
            .lock()
            .positions
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.state.lock().orders.clone()
    }

    pub fn closes(&self) -> Vec<ClosePosition> {
        self.state.lock().closes.clone()
    }

    pub fn leverage_calls(&self) -> Vec<(String, u32, MarginMode, PositionSide)> {
        self.state.lock().leverage_calls.clone()
    }

    pub fn sl_amends(&self) -> Vec<(String, PositionSide, Decimal)> {
        self.state.lock().sl_amends.clone()
    }

    fn next_id(state: &mut MockState) -> String {
        state.next_order_id += 1;
        format!("mock-{}", state.next_order_id)
    }

    fn reject(state: &MockState) -> Result<()> {
        if state.reject_orders {
            return Err(AdapterError::OrderRejected {
                venue: Venue::Okx,
                code: "51008".to_string(),
                message: "Insufficient margin".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Exchange for MockExchange {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn last_price(&self, symbol: &str) -> Result<Decimal> {
        self.state
            .lock()
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| AdapterError::InvalidInstrument(symbol.to_string()))
    }

    async fn kline_records(&self, query: &KlineQuery) -> Result<Vec<Kline>> {
        let state = self.state.lock();
        let key = (query.symbol.clone(), query.period);
        if state.failing_klines.contains(&key) {
            return Err(AdapterError::ConnectionTimeout {
                venue: Venue::Okx,
                timeout_ms: 10_000,
            });
        }
        let klines = state.klines.get(&key).cloned().unwrap_or_default();
        let skip = klines.len().saturating_sub(query.limit);
        Ok(klines.into_iter().skip(skip).collect())
    }

    async fn position(&self, symbol: &str, trade_type: TradeType) -> Result<PositionPair> {
        if trade_type == TradeType::Spot {
            return Err(AdapterError::NotSupported(
                "positions exist only for derivatives".to_string(),
            ));
        }
        Ok(self.position_pair(symbol))
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        let mut state = self.state.lock();
        Self::reject(&state)?;

        let fill_price = if order.price > Decimal::ZERO {
            order.price
        } else {
            state
                .prices
                .get(&order.symbol)
                .copied()
                .ok_or_else(|| AdapterError::InvalidInstrument(order.symbol.clone()))?
        };

        if !state.manual_fills && order.trade_type != TradeType::Spot {
            let pair = state.positions.entry(order.symbol.clone()).or_default();
            let side = order.position_side;
            let merged = match pair.get(side) {
                Some(existing) => {
                    let amount = existing.amount + order.size;
                    PositionInfo {
                        avg_price: (existing.avg_price * existing.amount
                            + fill_price * order.size)
                            / amount,
                        amount,
                        ..existing.clone()
                    }
                }
                None => PositionInfo {
                    leverage: order.leverage,
                    margin_mode: order.margin_mode,
                    ..sample_position(&order.symbol, side, order.size, fill_price, fill_price)
                },
            };
            pair.insert(merged);
        }

        state.orders.push(order.clone());
        Ok(Self::next_id(&mut state))
    }

    async fn close_position(&self, request: &ClosePosition) -> Result<String> {
        let mut state = self.state.lock();
        Self::reject(&state)?;

        if !state.manual_fills {
            if let Some(pair) = state.positions.get_mut(&request.symbol) {
                let remaining = pair
                    .get(request.direction)
                    .map(|p| (p.clone(), p.amount - request.amount));
                match request.direction {
                    PositionSide::Long => pair.long = None,
                    PositionSide::Short => pair.short = None,
                }
                if let Some((position, amount)) = remaining {
                    if amount > Decimal::ZERO {
                        pair.insert(PositionInfo { amount, ..position });
                    }
                }
                if pair.is_flat() {
                    state.positions.remove(&request.symbol);
                }
            }
        }

        state.closes.push(request.clone());
        Ok(Self::next_id(&mut state))
    }

    async fn set_leverage(
        &self,
        symbol: &str,
        leverage: u32,
        margin_mode: MarginMode,
        position_side: PositionSide,
    ) -> Result<()> {
        self.state.lock().leverage_calls.push((
            symbol.to_string(),
            leverage,
            margin_mode,
            position_side,
        ));
        Ok(())
    }

    async fn available_balance(&self, _currency: &str) -> Result<Decimal> {
        Ok(self.state.lock().balance)
    }

    async fn contract_multiplier(&self, symbol: &str, trade_type: TradeType) -> Result<Decimal> {
        if trade_type == TradeType::Spot {
            return Ok(Decimal::ONE);
        }
        Ok(self
            .state
            .lock()
            .multipliers
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ONE))
    }

    async fn amend_stop_loss(
        &self,
        symbol: &str,
        _trade_type: TradeType,
        position_side: PositionSide,
        stop_loss: Decimal,
    ) -> Result<()> {
        self.state
            .lock()
            .sl_amends
            .push((symbol.to_string(), position_side, stop_loss));
        Ok(())
    }
}

/// Derivatives position snapshot with PnL derived from the two prices
pub fn sample_position(
    symbol: &str,
    direction: PositionSide,
    amount: Decimal,
    avg_price: Decimal,
    mark_price: Decimal,
) -> PositionInfo {
    let per_unit = match direction {
        PositionSide::Long => mark_price - avg_price,
        PositionSide::Short => avg_price - mark_price,
    };
    let margin = avg_price * amount / Decimal::from(20);
    let pnl = per_unit * amount;
    let ratio = if margin.is_zero() {
        0.0
    } else {
        (pnl / margin).to_f64().unwrap_or(0.0)
    };
    PositionInfo {
        symbol: symbol.to_string(),
        direction,
        amount,
        avg_price,
        mark_price,
        margin,
        leverage: 20,
        margin_mode: MarginMode::Cross,
        unrealized_pnl: pnl,
        unrealized_return_ratio: ratio,
        liquidation_price: None,
        open_time: Utc::now(),
    }
}

fn series_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 11, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Candles over `closes`, one `period` apart, the last closing at a fixed
/// instant. Each bar opens at the previous close with half-unit wicks.
pub fn klines_from_closes(closes: &[f64], period: TimePeriod) -> Vec<Kline> {
    let n = closes.len() as i64;
    let end = series_end();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Kline {
                timestamp: end - Duration::minutes(period.minutes() * (n - 1 - i as i64)),
                open,
                high: open.max(close) + 0.5,
                low: open.min(close) - 0.5,
                close,
                volume: 10.0,
                quote_volume: 10.0 * close,
            }
        })
        .collect()
}

/// `bars` candles moving by `step` per bar from `start`
pub fn trending_klines(bars: usize, start: f64, step: f64, period: TimePeriod) -> Vec<Kline> {
    let closes: Vec<f64> = (0..bars).map(|i| start + step * i as f64).collect();
    klines_from_closes(&closes, period)
}
