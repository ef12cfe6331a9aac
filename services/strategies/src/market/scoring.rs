//! Per-period trend sub-score in `[-3, +3]`

use crate::indicators::{adx, bollinger, closes, ema, last_valid, slope3, trailing_mean};
use types::Kline;

/// Closed bars a window needs before it is scored
pub const MIN_BARS: usize = 200;

pub const SCORE_LIMIT: f64 = 3.0;

const ADX_PERIOD: usize = 14;
const ADX_STRONG: f64 = 25.0;
const ADX_WEAK: f64 = 20.0;
const BB_PERIOD: usize = 20;
const BB_MULT: f64 = 2.0;
const BANDWIDTH_LOOKBACK: usize = 50;
const COMPRESSION_RATIO: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodScore {
    pub score: f64,
    /// Last ADX(14) value, when defined
    pub adx: Option<f64>,
}

/// Score one period window; `None` with fewer than [`MIN_BARS`] bars
pub fn period_score(klines: &[Kline]) -> Option<PeriodScore> {
    if klines.len() < MIN_BARS {
        return None;
    }

    let closes = closes(klines);
    let close = *closes.last()?;
    let ema20 = ema(&closes, 20);
    let ema50 = ema(&closes, 50);
    let ema200 = ema(&closes, 200);

    let mut score: f64 = 0.0;

    let e200 = last_valid(&ema200)?;
    score += if close > e200 { 1.0 } else { -1.0 };

    let e20 = last_valid(&ema20)?;
    let e50 = last_valid(&ema50)?;
    let s20 = slope3(&ema20).unwrap_or(0.0);
    let s50 = slope3(&ema50).unwrap_or(0.0);
    if e20 > e50 && s20 > 0.0 && s50 > 0.0 {
        score += 1.0;
    } else if e20 < e50 && s20 < 0.0 && s50 < 0.0 {
        score -= 1.0;
    }

    let adx_last = last_valid(&adx(klines, ADX_PERIOD));
    match adx_last {
        Some(a) if a > ADX_STRONG => score += 1.0,
        Some(a) if a < ADX_WEAK => score -= 0.5,
        _ => {}
    }

    let bandwidth = bollinger(&closes, BB_PERIOD, BB_MULT).bandwidth();
    if let (Some(current), Some(mean)) = (
        last_valid(&bandwidth),
        trailing_mean(&bandwidth, BANDWIDTH_LOOKBACK),
    ) {
        if current < COMPRESSION_RATIO * mean {
            score -= 0.5;
        }
    }

    Some(PeriodScore {
        score: score.clamp(-SCORE_LIMIT, SCORE_LIMIT),
        adx: adx_last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trending_klines;
    use types::TimePeriod;

    #[test]
    fn test_short_window_not_scored() {
        let klines = trending_klines(199, 100.0, 1.0, TimePeriod::H1);
        assert!(period_score(&klines).is_none());
    }

    #[test]
    fn test_steady_uptrend_scores_bullish() {
        let klines = trending_klines(260, 100.0, 1.0, TimePeriod::H1);
        let scored = period_score(&klines).unwrap();
        // close > ema200, bullish ema stack, strong adx
        assert!(scored.score >= 2.5, "score {}", scored.score);
        assert!(scored.adx.unwrap() > 25.0);
    }

    #[test]
    fn test_steady_downtrend_scores_bearish() {
        let klines = trending_klines(260, 500.0, -1.0, TimePeriod::H1);
        let scored = period_score(&klines).unwrap();
        assert!(scored.score <= -1.0, "score {}", scored.score);
    }

    #[test]
    fn test_score_is_clamped() {
        for step in [-2.0, -0.3, 0.0, 0.3, 2.0] {
            let klines = trending_klines(240, 800.0, step, TimePeriod::M15);
            let scored = period_score(&klines).unwrap();
            assert!((-3.0..=3.0).contains(&scored.score));
        }
    }
}
