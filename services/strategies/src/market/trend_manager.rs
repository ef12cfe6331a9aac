//! Per-symbol trend state derived from the cached K-line windows

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};
use types::{Side, TimePeriod, TrendDirection, TrendState};

use super::kline_manager::{KlineManager, KlineWindow};
use super::scoring::{period_score, PeriodScore, SCORE_LIMIT};

const WEIGHT_4H: f64 = 0.5;
const WEIGHT_1H: f64 = 0.3;
const WEIGHT_15M: f64 = 0.2;
const DIRECTION_THRESHOLD: f64 = 1.5;
const STRONG_SHORT_SCORE: f64 = 2.0;
const STRONG_SHORT_ADX: f64 = 30.0;

/// Derive the trend of `symbol` from its windows.
///
/// Direction is `Unknown` unless the 15m, 1h and 4h windows all hold enough
/// bars to be scored. The 30m window only feeds `period_scores` and
/// `slope_30m`.
pub fn compute_trend(
    symbol: &str,
    windows: &HashMap<TimePeriod, KlineWindow>,
    now: DateTime<Utc>,
) -> TrendState {
    let score_of = |period: TimePeriod| -> Option<PeriodScore> {
        windows.get(&period).and_then(|w| period_score(w))
    };

    let mut state = TrendState::unknown(symbol, now);
    if let Some(last) = windows.get(&TimePeriod::M15).and_then(|w| w.last()) {
        state.last_price = last.close;
    }

    let m30 = windows.get(&TimePeriod::M30).and_then(|w| {
        let current = period_score(w)?;
        let slope = w
            .split_last()
            .and_then(|(_, previous)| period_score(previous))
            .map(|prev| current.score - prev.score)
            .unwrap_or(0.0);
        Some((current, slope))
    });
    if let Some((score, slope)) = m30 {
        state.period_scores.insert(TimePeriod::M30, score.score);
        state.slope_30m = slope;
    }

    let (m15, h1, h4) = match (
        score_of(TimePeriod::M15),
        score_of(TimePeriod::H1),
        score_of(TimePeriod::H4),
    ) {
        (Some(m15), Some(h1), Some(h4)) => (m15, h1, h4),
        _ => return state,
    };

    let mut scores = BTreeMap::new();
    scores.insert(TimePeriod::M15, m15.score);
    scores.insert(TimePeriod::H1, h1.score);
    scores.insert(TimePeriod::H4, h4.score);
    state.period_scores.extend(scores);

    let final_score = (WEIGHT_4H * h4.score + WEIGHT_1H * h1.score + WEIGHT_15M * m15.score)
        .clamp(-SCORE_LIMIT, SCORE_LIMIT);
    state.score = final_score;
    state.direction = if final_score >= DIRECTION_THRESHOLD {
        TrendDirection::Up
    } else if final_score <= -DIRECTION_THRESHOLD {
        TrendDirection::Down
    } else {
        TrendDirection::Neutral
    };
    state.adx_15m = m15.adx;
    state.strong_short_tf =
        m15.score >= STRONG_SHORT_SCORE && m15.adx.is_some_and(|a| a > STRONG_SHORT_ADX);
    state
}

/// Owns the published `TrendState` per symbol. States are replaced whole;
/// readers get clones.
pub struct TrendManager {
    klines: Arc<KlineManager>,
    states: RwLock<HashMap<String, TrendState>>,
}

impl TrendManager {
    pub fn new(klines: Arc<KlineManager>) -> Self {
        Self {
            klines,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Recompute every tracked symbol; driven by the K-line scheduler
    pub fn refresh(&self) {
        let now = Utc::now();
        for symbol in self.klines.symbols() {
            let windows = self.klines.windows(symbol);
            let state = compute_trend(symbol, &windows, now);
            self.publish(state);
        }
    }

    pub fn publish(&self, state: TrendState) {
        let previous = self
            .states
            .write()
            .insert(state.symbol.clone(), state.clone())
            .map(|s| s.direction);

        if previous != Some(state.direction) {
            info!(
                symbol = %state.symbol,
                direction = ?state.direction,
                score = state.score,
                strong_short_tf = state.strong_short_tf,
                "Trend changed"
            );
        } else {
            debug!(symbol = %state.symbol, score = state.score, "Trend refreshed");
        }
    }

    pub fn state(&self, symbol: &str) -> Option<TrendState> {
        self.states.read().get(symbol).cloned()
    }

    /// State exists and its direction matches `side`
    pub fn is_trend_ok(&self, symbol: &str, side: Side) -> bool {
        self.states
            .read()
            .get(symbol)
            .is_some_and(|s| s.direction.matches_side(side))
    }

    pub fn is_strong_short_tf(&self, symbol: &str) -> bool {
        self.states
            .read()
            .get(symbol)
            .is_some_and(|s| s.strong_short_tf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::KlineManagerConfig;
    use crate::testing::{trending_klines, MockExchange};

    fn windows(bars: usize, step: f64) -> HashMap<TimePeriod, KlineWindow> {
        TimePeriod::ALL
            .into_iter()
            .map(|p| (p, Arc::new(trending_klines(bars, 1000.0, step, p))))
            .collect()
    }

    #[test]
    fn test_uptrend_everywhere_is_up() {
        let state = compute_trend("BTC/USDT", &windows(260, 1.0), Utc::now());
        assert_eq!(state.direction, TrendDirection::Up);
        assert!(state.score >= 1.5 && state.score <= 3.0);
        assert!(state.strong_short_tf);
        assert_eq!(state.period_scores.len(), 4);
    }

    #[test]
    fn test_final_score_is_weighted_sum() {
        let w = windows(260, -1.0);
        let state = compute_trend("BTC/USDT", &w, Utc::now());
        let sub = |p: TimePeriod| period_score(&w[&p]).unwrap().score;
        let expected =
            0.5 * sub(TimePeriod::H4) + 0.3 * sub(TimePeriod::H1) + 0.2 * sub(TimePeriod::M15);
        assert!((state.score - expected).abs() < 1e-9);
        assert!(state.score < 0.0);
        assert_ne!(state.direction, TrendDirection::Up);
        assert!(!state.strong_short_tf);
    }

    #[test]
    fn test_short_window_is_unknown() {
        let mut w = windows(260, 1.0);
        w.insert(
            TimePeriod::H4,
            Arc::new(trending_klines(150, 1000.0, 1.0, TimePeriod::H4)),
        );
        let state = compute_trend("BTC/USDT", &w, Utc::now());
        assert_eq!(state.direction, TrendDirection::Unknown);
        assert_eq!(state.score, 0.0);
        assert!(state.period_score(TimePeriod::H4).is_none());
    }

    #[tokio::test]
    async fn test_refresh_publishes_and_filters() {
        let mock = Arc::new(MockExchange::new());
        for period in TimePeriod::ALL {
            mock.set_klines("ETH/USDT", period, trending_klines(260, 1000.0, 1.0, period));
        }
        let klines = Arc::new(KlineManager::new(
            mock,
            KlineManagerConfig::new(vec!["ETH/USDT".to_string()], 260),
        ));
        klines.backfill().await.unwrap();

        let trends = TrendManager::new(klines);
        assert!(!trends.is_trend_ok("ETH/USDT", Side::Buy));
        trends.refresh();
        assert!(trends.is_trend_ok("ETH/USDT", Side::Buy));
        assert!(!trends.is_trend_ok("ETH/USDT", Side::Sell));
        assert!(trends.is_strong_short_tf("ETH/USDT"));
        assert!(!trends.is_trend_ok("BTC/USDT", Side::Buy));
    }
}
