//! Market-data side of the pipeline: aligned K-line refresh and trend scoring

pub mod kline_manager;
pub mod schedule;
pub mod scoring;
pub mod trend_manager;

pub use kline_manager::{KlineManager, KlineManagerConfig, KlineWindow};
pub use schedule::{next_tick, periods_due};
pub use scoring::{period_score, PeriodScore};
pub use trend_manager::{compute_trend, TrendManager};
