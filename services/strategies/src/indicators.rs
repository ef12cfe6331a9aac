//! Technical indicators over ascending-time series
//!
//! Every function returns a series aligned with its input. Positions inside
//! the warm-up window hold `NaN`; use [`last_valid`] to read the newest value.

use types::Kline;

/// Simple moving average
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum: f64 = values[..period].iter().sum();
    result[period - 1] = sum / period as f64;
    for i in period..n {
        sum += values[i] - values[i - period];
        result[i] = sum / period as f64;
    }
    result
}

/// Exponential moving average seeded with the SMA of the first `period` values
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = seed;

    let mut prev = seed;
    for i in period..n {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

/// Wilder smoothing (alpha = 1/period), seeded with the mean of the first
/// `period` non-NaN values
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }

    let start = match values.iter().position(|v| !v.is_nan()) {
        Some(s) => s,
        None => return result,
    };
    let seed_end = start + period;
    if seed_end > n || values[start..seed_end].iter().any(|v| v.is_nan()) {
        return result;
    }

    let seed = values[start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

/// Bollinger bands (population standard deviation)
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

impl BollingerBands {
    /// `(upper - lower) / middle` per bar
    pub fn bandwidth(&self) -> Vec<f64> {
        self.upper
            .iter()
            .zip(&self.lower)
            .zip(&self.middle)
            .map(|((u, l), m)| if *m == 0.0 { f64::NAN } else { (u - l) / m })
            .collect()
    }
}

pub fn bollinger(values: &[f64], period: usize, multiplier: f64) -> BollingerBands {
    let middle = sma(values, period);
    let n = values.len();
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];

    for i in 0..n {
        if middle[i].is_nan() {
            continue;
        }
        let window = &values[i + 1 - period..=i];
        let variance =
            window.iter().map(|v| (v - middle[i]).powi(2)).sum::<f64>() / period as f64;
        let band = multiplier * variance.sqrt();
        upper[i] = middle[i] + band;
        lower[i] = middle[i] - band;
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

/// True range; the first bar uses high - low
pub fn true_range(klines: &[Kline]) -> Vec<f64> {
    klines
        .iter()
        .enumerate()
        .map(|(i, k)| {
            if i == 0 {
                k.high - k.low
            } else {
                let prev_close = klines[i - 1].close;
                (k.high - k.low)
                    .max((k.high - prev_close).abs())
                    .max((k.low - prev_close).abs())
            }
        })
        .collect()
}

/// Average directional index, Wilder-smoothed
pub fn adx(klines: &[Kline], period: usize) -> Vec<f64> {
    let n = klines.len();
    if n < 2 || period == 0 {
        return vec![f64::NAN; n];
    }

    let mut plus_dm = vec![f64::NAN; n];
    let mut minus_dm = vec![f64::NAN; n];
    let mut tr = vec![f64::NAN; n];
    let raw_tr = true_range(klines);

    for i in 1..n {
        let up = klines[i].high - klines[i - 1].high;
        let down = klines[i - 1].low - klines[i].low;
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
        tr[i] = raw_tr[i];
    }

    let smooth_tr = wilder_smooth(&tr, period);
    let smooth_plus = wilder_smooth(&plus_dm, period);
    let smooth_minus = wilder_smooth(&minus_dm, period);

    let dx: Vec<f64> = (0..n)
        .map(|i| {
            if smooth_tr[i].is_nan() || smooth_tr[i] == 0.0 {
                return f64::NAN;
            }
            let plus_di = 100.0 * smooth_plus[i] / smooth_tr[i];
            let minus_di = 100.0 * smooth_minus[i] / smooth_tr[i];
            let sum = plus_di + minus_di;
            if sum == 0.0 {
                0.0
            } else {
                100.0 * (plus_di - minus_di).abs() / sum
            }
        })
        .collect();

    wilder_smooth(&dx, period)
}

/// Relative strength index, Wilder-smoothed gains and losses
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut gains = vec![f64::NAN; n];
    let mut losses = vec![f64::NAN; n];
    for i in 1..n {
        let change = values[i] - values[i - 1];
        gains[i] = change.max(0.0);
        losses[i] = (-change).max(0.0);
    }

    let avg_gain = wilder_smooth(&gains, period);
    let avg_loss = wilder_smooth(&losses, period);
    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| {
            if g.is_nan() || l.is_nan() {
                f64::NAN
            } else if *l == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + g / l)
            }
        })
        .collect()
}

/// `x[-1] - x[-3]`
pub fn slope3(series: &[f64]) -> Option<f64> {
    let n = series.len();
    if n < 3 {
        return None;
    }
    let diff = series[n - 1] - series[n - 3];
    (!diff.is_nan()).then_some(diff)
}

pub fn last_valid(series: &[f64]) -> Option<f64> {
    series.last().copied().filter(|v| !v.is_nan())
}

/// Mean of the last `count` non-NaN values
pub fn trailing_mean(series: &[f64], count: usize) -> Option<f64> {
    let tail: Vec<f64> = series
        .iter()
        .rev()
        .filter(|v| !v.is_nan())
        .take(count)
        .copied()
        .collect();
    if tail.is_empty() {
        None
    } else {
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }
}

pub fn closes(klines: &[Kline]) -> Vec<f64> {
    klines.iter().map(|k| k.close).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bars(data: &[(f64, f64, f64)]) -> Vec<Kline> {
        data.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| Kline {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 900, 0).unwrap(),
                open: close,
                high,
                low,
                close,
                volume: 1.0,
                quote_volume: close,
            })
            .collect()
    }

    #[test]
    fn test_sma_window() {
        let result = sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(result[1].is_nan());
        assert_eq!(result[2], 2.0);
        assert_eq!(result[3], 3.0);
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let result = ema(&[2.0, 4.0, 6.0, 8.0], 3);
        assert!(result[1].is_nan());
        assert_eq!(result[2], 4.0);
        // alpha = 0.5
        assert_eq!(result[3], 6.0);
    }

    #[test]
    fn test_bollinger_constant_series_has_zero_width() {
        let bands = bollinger(&[5.0; 25], 20, 2.0);
        assert_eq!(bands.upper[24], 5.0);
        assert_eq!(bands.lower[24], 5.0);
        assert_eq!(bands.bandwidth()[24], 0.0);
        assert!(bands.middle[18].is_nan());
    }

    #[test]
    fn test_adx_strong_trend_above_choppy() {
        let trending: Vec<(f64, f64, f64)> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                (base + 1.0, base - 1.0, base + 0.5)
            })
            .collect();
        let choppy: Vec<(f64, f64, f64)> = (0..60)
            .map(|i| {
                let base = if i % 2 == 0 { 100.0 } else { 101.0 };
                (base + 1.0, base - 1.0, base)
            })
            .collect();

        let strong = last_valid(&adx(&bars(&trending), 14)).unwrap();
        let weak = last_valid(&adx(&bars(&choppy), 14)).unwrap();
        assert!(strong > 50.0, "trending adx {strong}");
        assert!(weak < strong);
        assert!((0.0..=100.0).contains(&weak));
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..30).map(|i| i as f64).collect();
        assert_eq!(last_valid(&rsi(&rising, 14)), Some(100.0));

        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert_eq!(last_valid(&rsi(&falling, 14)), Some(0.0));
    }

    #[test]
    fn test_slope3_and_trailing_mean() {
        assert_eq!(slope3(&[1.0, 2.0, 4.0]), Some(3.0));
        assert_eq!(slope3(&[1.0, 2.0]), None);
        assert_eq!(trailing_mean(&[f64::NAN, 1.0, 2.0, 3.0], 2), Some(2.5));
        assert_eq!(trailing_mean(&[f64::NAN], 2), None);
    }
}
