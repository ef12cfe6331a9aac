//! Wall-clock alignment of the K-line refresher

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use strategies::market::{next_tick, periods_due};
use strategies::testing::{trending_klines, MockExchange};
use strategies::{KlineManager, KlineManagerConfig, TrendManager};
use types::{TimePeriod, TrendDirection};

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 11, h, m, s).unwrap()
}

/// Ticks the refresher would fire from `start`, with the periods each one
/// refreshes
fn schedule_from(start: DateTime<Utc>, ticks: usize) -> Vec<(DateTime<Utc>, Vec<TimePeriod>)> {
    let mut now = start;
    let mut fired = Vec::with_capacity(ticks);
    for _ in 0..ticks {
        let tick = next_tick(now);
        fired.push((tick, periods_due(tick)));
        now = tick;
    }
    fired
}

#[test]
fn test_refresh_sequence_from_mid_bucket() {
    use TimePeriod::*;

    let fired = schedule_from(at(10, 7, 12), 8);
    let expected = vec![
        (at(10, 15, 30), vec![M15]),
        (at(10, 30, 30), vec![M15, M30]),
        (at(10, 45, 30), vec![M15]),
        (at(11, 0, 30), vec![M15, M30, H1]),
        (at(11, 15, 30), vec![M15]),
        (at(11, 30, 30), vec![M15, M30]),
        (at(11, 45, 30), vec![M15]),
        (at(12, 0, 30), vec![M15, M30, H1, H4]),
    ];
    assert_eq!(fired, expected);
}

#[test]
fn test_four_hour_boundaries_only() {
    for hour in 0..24 {
        let due = periods_due(at(hour, 0, 30));
        assert_eq!(due.contains(&TimePeriod::H4), hour % 4 == 0, "hour {hour}");
        assert!(due.contains(&TimePeriod::H1));
    }
}

#[test]
fn test_ticks_are_strictly_increasing() {
    let fired = schedule_from(at(23, 59, 59), 100);
    for pair in fired.windows(2) {
        assert!(pair[1].0 > pair[0].0);
        assert_eq!((pair[1].0 - pair[0].0).num_minutes(), 15);
    }
}

fn loaded_exchange() -> Arc<MockExchange> {
    let exchange = Arc::new(MockExchange::new());
    for period in TimePeriod::ALL {
        exchange.set_klines(
            "BTC/USDT",
            period,
            trending_klines(260, 1000.0, 1.0, period),
        );
    }
    exchange
}

#[tokio::test]
async fn test_tick_refreshes_only_due_periods() {
    let exchange = loaded_exchange();
    let klines = KlineManager::new(
        exchange,
        KlineManagerConfig::new(vec!["BTC/USDT".to_string()], 210),
    );

    klines.tick(&periods_due(at(10, 30, 30))).await;
    assert_eq!(klines.get("BTC/USDT", TimePeriod::M15).unwrap().len(), 210);
    assert!(klines.get("BTC/USDT", TimePeriod::M30).is_some());
    assert!(klines.get("BTC/USDT", TimePeriod::H1).is_none());
    assert!(klines.get("BTC/USDT", TimePeriod::H4).is_none());

    klines.tick(&periods_due(at(12, 0, 30))).await;
    for period in TimePeriod::ALL {
        assert!(klines.get("BTC/USDT", period).is_some(), "{period} missing");
    }
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_window() {
    let exchange = loaded_exchange();
    let klines = KlineManager::new(
        exchange.clone(),
        KlineManagerConfig::new(vec!["BTC/USDT".to_string()], 210),
    );
    klines.backfill().await.unwrap();
    let before = klines.get("BTC/USDT", TimePeriod::M15).unwrap();

    exchange.fail_klines("BTC/USDT", TimePeriod::M15, true);
    klines.tick(&[TimePeriod::M15]).await;

    let after = klines.get("BTC/USDT", TimePeriod::M15).unwrap();
    assert!(Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn test_backfill_then_trend_refresh() {
    let klines = Arc::new(KlineManager::new(
        loaded_exchange(),
        KlineManagerConfig::new(vec!["BTC/USDT".to_string()], 250),
    ));
    klines.backfill().await.unwrap();

    let trends = TrendManager::new(klines);
    trends.refresh();
    let state = trends.state("BTC/USDT").unwrap();
    assert_eq!(state.direction, TrendDirection::Up);
    assert!((-3.0..=3.0).contains(&state.score));
}
