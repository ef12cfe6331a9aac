//! Order sizing and protective price levels

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use types::{PositionInfo, PositionSide, Side, SignalLevel};

use crate::error::{Result, StrategyError};

pub const DEFAULT_LEVERAGE: u32 = 20;

/// Share of floating profit a tightened stop locks in
pub const LOCK_PROFIT_RATIO: Decimal = dec!(0.3);

/// 2% of the notional is held back for slippage
const SLIPPAGE_FACTOR: Decimal = dec!(0.98);

/// Balance share used when the caller passes no explicit size
pub fn level_default_pct(level: SignalLevel) -> f64 {
    match level {
        SignalLevel::L1 => 0.30,
        SignalLevel::L2 => 0.20,
        SignalLevel::L3 => 0.15,
    }
}

pub fn effective_leverage(leverage: u32) -> u32 {
    if leverage == 0 {
        DEFAULT_LEVERAGE
    } else {
        leverage
    }
}

fn pct_factor(pct: f64) -> Option<Decimal> {
    Decimal::from_f64(pct / 100.0)
}

fn round_price(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn floor_dp(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::ToZero)
}

/// Take-profit price `tp_pct` percent in the trade's favour; `None` when
/// `tp_pct` is not positive
pub fn take_profit_price(price: Decimal, side: Side, tp_pct: f64) -> Option<Decimal> {
    if tp_pct <= 0.0 {
        return None;
    }
    let factor = pct_factor(tp_pct)?;
    match side {
        Side::Buy => Some(round_price(price * (Decimal::ONE + factor))),
        Side::Sell => Some(round_price(price * (Decimal::ONE - factor))),
        Side::Hold => None,
    }
}

pub fn stop_loss_price(price: Decimal, side: Side, sl_pct: f64) -> Option<Decimal> {
    if sl_pct <= 0.0 {
        return None;
    }
    let factor = pct_factor(sl_pct)?;
    match side {
        Side::Buy => Some(round_price(price * (Decimal::ONE - factor))),
        Side::Sell => Some(round_price(price * (Decimal::ONE + factor))),
        Side::Hold => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderSize {
    /// Base-asset quantity, floored to 3 decimals
    pub quantity: Decimal,
    /// Exchange contracts, floored to 2 decimals
    pub contracts: Decimal,
}

/// Size an order from the available balance.
///
/// `notional = available * size_pct * 0.98`,
/// `quantity = notional * leverage / price`,
/// `contracts = quantity / multiplier`.
pub fn order_size(
    available: Decimal,
    size_pct: f64,
    leverage: u32,
    price: Decimal,
    multiplier: Decimal,
) -> Result<OrderSize> {
    if price <= Decimal::ZERO {
        return Err(StrategyError::sizing("price must be positive"));
    }
    if multiplier <= Decimal::ZERO {
        return Err(StrategyError::sizing("contract multiplier must be positive"));
    }
    let pct = Decimal::from_f64(size_pct)
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| StrategyError::sizing(format!("invalid size fraction {size_pct}")))?;

    let notional = available * pct * SLIPPAGE_FACTOR;
    let quantity = notional * Decimal::from(leverage) / price;
    let size = OrderSize {
        quantity: floor_dp(quantity, 3),
        contracts: floor_dp(quantity / multiplier, 2),
    };

    if size.contracts.is_zero() {
        return Err(StrategyError::sizing(format!(
            "balance {available} too small for one lot at {price}"
        )));
    }
    Ok(size)
}

/// Stop that locks in `ratio` of the per-unit floating profit, or `None`
/// while the position is not in profit
pub fn trailing_stop(position: &PositionInfo, ratio: Decimal) -> Option<Decimal> {
    let profit = position.favourable_move();
    if profit <= Decimal::ZERO {
        return None;
    }
    let stop = match position.direction {
        PositionSide::Long => position.avg_price + ratio * profit,
        PositionSide::Short => position.avg_price - ratio * profit,
    };
    Some(round_price(stop))
}

/// Contracts to shed for a partial reduce, floored to 2 decimals
pub fn reduce_amount(amount: Decimal, percent: f64) -> Option<Decimal> {
    let pct = Decimal::from_f64(percent)?;
    let part = floor_dp(amount * pct, 2);
    (part > Decimal::ZERO).then_some(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use types::MarginMode;

    #[test]
    fn test_protective_prices() {
        assert_eq!(take_profit_price(dec!(100), Side::Buy, 0.8), Some(dec!(100.80)));
        assert_eq!(take_profit_price(dec!(100), Side::Sell, 0.8), Some(dec!(99.20)));
        assert_eq!(stop_loss_price(dec!(100), Side::Buy, 0.9), Some(dec!(99.10)));
        assert_eq!(stop_loss_price(dec!(100), Side::Sell, 0.9), Some(dec!(100.90)));
        assert_eq!(take_profit_price(dec!(100), Side::Buy, 0.0), None);
        assert_eq!(stop_loss_price(dec!(33.333), Side::Buy, 1.0), Some(dec!(33.00)));
    }

    #[test]
    fn test_order_size_formula() {
        // 10000 * 0.2 * 0.98 = 1960 notional, x20 = 39200 / 100000 = 0.392
        let size = order_size(dec!(10000), 0.2, 20, dec!(100000), dec!(0.01)).unwrap();
        assert_eq!(size.quantity, dec!(0.392));
        assert_eq!(size.contracts, dec!(39.2));

        let size = order_size(dec!(1000), 0.063, 20, dec!(3456.7), dec!(1)).unwrap();
        // 1000 * 0.063 * 0.98 * 20 / 3456.7 = 0.35722...
        assert_eq!(size.quantity, dec!(0.357));
        assert_eq!(size.contracts, dec!(0.35));
    }

    #[test]
    fn test_order_size_rejects_dust() {
        assert!(order_size(dec!(1), 0.01, 1, dec!(100000), dec!(1)).is_err());
        assert!(order_size(dec!(1000), 0.2, 20, Decimal::ZERO, dec!(1)).is_err());
    }

    #[test]
    fn test_level_defaults() {
        assert_eq!(level_default_pct(SignalLevel::L1), 0.30);
        assert_eq!(level_default_pct(SignalLevel::L2), 0.20);
        assert_eq!(level_default_pct(SignalLevel::L3), 0.15);
        assert_eq!(effective_leverage(0), 20);
        assert_eq!(effective_leverage(5), 5);
    }

    #[test]
    fn test_trailing_stop_locks_profit() {
        let mut position = PositionInfo {
            symbol: "BTC/USDT".into(),
            direction: PositionSide::Long,
            amount: dec!(2),
            avg_price: dec!(100),
            mark_price: dec!(110),
            margin: dec!(10),
            leverage: 20,
            margin_mode: MarginMode::Cross,
            unrealized_pnl: dec!(20),
            unrealized_return_ratio: 0.1,
            liquidation_price: None,
            open_time: Utc::now(),
        };
        assert_eq!(trailing_stop(&position, LOCK_PROFIT_RATIO), Some(dec!(103.00)));

        position.direction = PositionSide::Short;
        assert_eq!(trailing_stop(&position, LOCK_PROFIT_RATIO), None);
        position.mark_price = dec!(90);
        assert_eq!(trailing_stop(&position, LOCK_PROFIT_RATIO), Some(dec!(97.00)));
    }

    #[test]
    fn test_reduce_amount() {
        assert_eq!(reduce_amount(dec!(3), 0.5), Some(dec!(1.5)));
        assert_eq!(reduce_amount(dec!(0.01), 0.3), None);
    }
}
