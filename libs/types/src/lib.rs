//! # Dispatcher Domain Types
//!
//! Value types shared by every stage of the signal → decision → position
//! pipeline.
//!
//! ## Design Philosophy
//!
//! - **Closed enums at decision sites**: `Side`, `Action`, `TrendDirection`,
//!   `OrderType`, `TradeType` and `MarginMode` are matched exhaustively.
//! - **Decimal money, float indicators**: prices, sizes and PnL use
//!   [`rust_decimal::Decimal`]; indicator math and scores stay `f64`.
//! - **One canonical symbol form**: `BASE/QUOTE`. See [`symbol`] for the
//!   conversions to exchange instrument ids.
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{Signal, SignalLevel, Side};
//!
//! let json = r#"{"strategy":"tv-level","symbol":"BTC/USDT","side":"buy",
//!     "price":113990.0,"level":2,"timestamp":"2025-08-10T21:54:30+08:00"}"#;
//! let signal: Signal = serde_json::from_str(json).unwrap();
//! assert_eq!(signal.level, SignalLevel::L2);
//! assert_eq!(signal.side, Side::Buy);
//! ```

pub mod decision;
pub mod error;
pub mod market;
pub mod position;
pub mod signal;
pub mod symbol;
pub mod trading;
pub mod trend;

pub use decision::{Action, Decision, DecisionContext};
pub use error::{Result, TypeError};
pub use market::{Kline, TimePeriod};
pub use position::{LocalPositionMeta, PositionInfo};
pub use signal::{Signal, SignalLevel};
pub use trading::{MarginMode, OrderRecord, OrderRequest, OrderType, PositionSide, Side, TradeType};
pub use trend::{TrendDirection, TrendState};
