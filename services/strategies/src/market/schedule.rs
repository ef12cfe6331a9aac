//! Wall-clock alignment of the K-line refresher
//!
//! Ticks land 30 seconds after each 15-minute boundary so the exchange has
//! published the candle that just closed.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use types::TimePeriod;

pub const TICK_MINUTES: i64 = 15;
pub const PUBLISH_GRACE_SECS: i64 = 30;

/// Start of the 15-minute bucket containing `t`
pub fn truncate_to_tick(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    let truncated = secs - secs.rem_euclid(TICK_MINUTES * 60);
    Utc.timestamp_opt(truncated, 0).single().unwrap_or(t)
}

/// First tick strictly after `now`
pub fn next_tick(now: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = truncate_to_tick(now) + Duration::seconds(PUBLISH_GRACE_SECS);
    if candidate > now {
        candidate
    } else {
        candidate + Duration::minutes(TICK_MINUTES)
    }
}

/// Periods whose candle closed at the boundary this tick follows
pub fn periods_due(tick: DateTime<Utc>) -> Vec<TimePeriod> {
    let boundary = truncate_to_tick(tick);
    TimePeriod::ALL
        .into_iter()
        .filter(|p| p.closes_at(boundary.hour(), boundary.minute()))
        .collect()
}
