//! Stateless decision engine over `(signal, trend, position)`
//!
//! Policy for strategies that do not delegate to the signal manager's
//! `decide`, including the copy-trade follower.

use parking_lot::Mutex;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;
use types::{
    Action, Decision, PositionInfo, PositionSide, Side, Signal, TimePeriod, TrendDirection,
    TrendState,
};

/// Relative price difference under which two signals count as equal
const DUPLICATE_PRICE_TOLERANCE: f64 = 0.001;
const TAKE_PROFIT_RATIO: f64 = 0.25;
const OVERSOLD_SCORE: f64 = -1.5;
const OVERBOUGHT_SCORE: f64 = 1.5;
const BAND_BUFFER: f64 = 0.01;
const RSI_BUY_MAX: f64 = 40.0;
const RSI_SELL_MIN: f64 = 60.0;
const EXHAUSTION_STRENGTH: f64 = 0.9;

/// Decision plus the side it should be executed on. Ranging-regime entries
/// turn a `hold` signal into a buy or a sell.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineDecision {
    pub decision: Decision,
    pub side: Side,
}

impl EngineDecision {
    fn new(action: Action, side: Side, reason: &str) -> Self {
        Self {
            decision: Decision::new(action, reason),
            side,
        }
    }

    fn ignore(side: Side, reason: &str) -> Self {
        Self::new(Action::Ignore, side, reason)
    }

    pub fn action(&self) -> Action {
        self.decision.action
    }
}

/// Score inputs read off a `TrendState`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketFactors {
    pub score: f64,
    pub score_4h: Option<f64>,
    pub score_1h: Option<f64>,
    pub score_30m: Option<f64>,
    pub slope_30m: f64,
}

impl From<&TrendState> for MarketFactors {
    fn from(trend: &TrendState) -> Self {
        Self {
            score: trend.score,
            score_4h: trend.period_score(TimePeriod::H4),
            score_1h: trend.period_score(TimePeriod::H1),
            score_30m: trend.period_score(TimePeriod::M30),
            slope_30m: trend.slope_30m,
        }
    }
}

fn is_duplicate(signal: &Signal, last: &Signal) -> bool {
    if signal.side != last.side || signal.level != last.level {
        return false;
    }
    if last.price.is_zero() {
        return signal.price.is_zero();
    }
    let diff = ((signal.price - last.price) / last.price).abs();
    diff.to_f64().is_some_and(|d| d < DUPLICATE_PRICE_TOLERANCE)
}

fn meta_any(signal: &Signal, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| signal.meta_f64(k))
}

/// Evaluate one signal. `last` is the previous signal seen for the symbol.
pub fn evaluate(
    signal: &Signal,
    trend: &TrendState,
    position: Option<&PositionInfo>,
    last: Option<&Signal>,
) -> EngineDecision {
    if last.is_some_and(|l| is_duplicate(signal, l)) {
        return EngineDecision::ignore(signal.side, "duplicate-signal");
    }

    match position {
        Some(held) => evaluate_held(signal, trend, held),
        None if signal.side == Side::Hold && trend.direction == TrendDirection::Neutral => {
            evaluate_ranging(signal, trend)
        }
        None => evaluate_entry(signal, trend),
    }
}

fn evaluate_entry(signal: &Signal, trend: &TrendState) -> EngineDecision {
    let side = signal.side;
    let strength = signal.strength();
    let factors = MarketFactors::from(trend);

    if trend.direction.matches_side(side) && strength > 0.5 {
        return EngineDecision::new(Action::Open, side, "trend-aligned-entry");
    }

    let reversal = signal.meta_bool("reversal") || trend.direction == TrendDirection::Reversal;
    if reversal && side != Side::Hold && strength >= 0.7 {
        return EngineDecision::new(Action::Open, side, "reversal-entry");
    }

    let rebound = match side {
        Side::Buy => factors.slope_30m > 0.0 && factors.score < OVERSOLD_SCORE,
        Side::Sell => factors.slope_30m < 0.0 && factors.score > OVERBOUGHT_SCORE,
        Side::Hold => false,
    };
    if rebound && strength > 0.3 {
        return EngineDecision::new(Action::Open, side, "score-slope-turn");
    }

    if let (Some(h4), Some(h1), Some(m30)) = (factors.score_4h, factors.score_1h, factors.score_30m)
    {
        let aligned = match side {
            Side::Buy => h4 < h1 && h1 <= m30,
            Side::Sell => h4 > h1 && h1 >= m30,
            Side::Hold => false,
        };
        if aligned && strength > 0.35 {
            return EngineDecision::new(Action::Open, side, "multi-timeframe-alignment");
        }
    }

    EngineDecision::ignore(side, "no-entry-edge")
}

fn evaluate_ranging(signal: &Signal, trend: &TrendState) -> EngineDecision {
    let bands = (
        meta_any(signal, &["upper", "Upper"]),
        meta_any(signal, &["lower", "Lower"]),
        meta_any(signal, &["rsi", "RSI"]),
    );
    let (upper, lower, rsi) = match bands {
        (Some(u), Some(l), Some(r)) => (u, l, r),
        _ => return EngineDecision::ignore(Side::Hold, "ranging-missing-bands"),
    };

    let price = match signal.price.to_f64() {
        Some(p) if p > 0.0 => p,
        _ => trend.last_price,
    };
    let action = if signal.strength() >= 0.5 {
        Action::Open
    } else {
        Action::OpenSmall
    };

    if price <= lower * (1.0 + BAND_BUFFER) && rsi < RSI_BUY_MAX {
        EngineDecision::new(action, Side::Buy, "ranging-low-band-buy")
    } else if price >= upper * (1.0 - BAND_BUFFER) && rsi > RSI_SELL_MIN {
        EngineDecision::new(action, Side::Sell, "ranging-high-band-sell")
    } else {
        EngineDecision::ignore(Side::Hold, "ranging-mid-band")
    }
}

fn evaluate_held(signal: &Signal, trend: &TrendState, held: &PositionInfo) -> EngineDecision {
    let held_side = held.direction.opening_side();
    let strength = signal.strength();

    if held.unrealized_return_ratio > TAKE_PROFIT_RATIO {
        return EngineDecision::new(Action::Close, held_side, "take-profit");
    }
    if trend.direction.contradicts_side(held_side) && strength >= 0.15 {
        return EngineDecision::new(Action::Close, held_side, "trend-against-position");
    }
    if trend.direction.matches_side(held_side) && signal.side == held_side {
        return if strength >= EXHAUSTION_STRENGTH {
            EngineDecision {
                decision: Decision::reduce(0.5, "exhaustion-reduce"),
                side: held_side,
            }
        } else if strength >= 0.6 {
            EngineDecision::new(Action::Add, held_side, "trend-add")
        } else {
            EngineDecision::new(Action::AddSmall, held_side, "trend-add-small")
        };
    }
    EngineDecision::ignore(held_side, "hold-position")
}

/// Copy-trade table: mirror the tracked wallet's position on our account
pub fn copy_trade_action(
    wallet: Option<PositionSide>,
    ours: Option<&PositionInfo>,
    fill_side: Side,
) -> Action {
    match (wallet, ours) {
        (None, Some(_)) => Action::Close,
        (None, None) => Action::Ignore,
        (Some(_), None) => Action::Open,
        (Some(w), Some(p)) if w == p.direction => match fill_side {
            Side::Buy => Action::Add,
            Side::Sell => Action::Reduce,
            Side::Hold => Action::Ignore,
        },
        (Some(_), Some(_)) => Action::Ignore,
    }
}

/// Keeps the last seen signal per symbol for de-duplication
#[derive(Debug, Default)]
pub struct DecisionEngine {
    last_seen: Mutex<HashMap<String, Signal>>,
}

impl DecisionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &self,
        signal: &Signal,
        trend: &TrendState,
        position: Option<&PositionInfo>,
    ) -> EngineDecision {
        let previous = self
            .last_seen
            .lock()
            .insert(signal.symbol.clone(), signal.clone());
        evaluate(signal, trend, position, previous.as_ref())
    }
}

/// Unrealized profit expressed in multiples of the initial risk
/// `entry * sl_pct / 100`
pub fn unrealized_r(position: &PositionInfo, sl_pct: f64) -> f64 {
    let risk = position.avg_price * Decimal::from_f64(sl_pct / 100.0).unwrap_or_default();
    if risk.is_zero() {
        return 0.0;
    }
    (position.favourable_move() / risk).to_f64().unwrap_or(0.0)
}
