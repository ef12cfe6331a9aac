//! # Dispatcher Strategy Pipeline
//!
//! ## Purpose
//!
//! Everything between an inbound [`types::Signal`] and an order on the
//! exchange:
//!
//! - **Market data**: [`market::KlineManager`] keeps multi-timeframe candle
//!   windows fresh on an aligned 15 minute schedule and drives
//!   [`market::TrendManager`], which scores each symbol's trend.
//! - **Arbitration**: [`signal::SignalManager`] stores the latest signal per
//!   level and decides what a new signal means; [`signal::SignalGate`] is the
//!   older gate with L3 → L2 upgrade.
//! - **Decisions**: [`engine`] maps `(signal, trend, position)` to an action
//!   for strategies that do not use the signal manager.
//! - **Execution**: [`position::PositionService`] sizes and places orders,
//!   keeps per-level position metadata and persists order records.
//! - **Routing**: [`dispatcher::StrategyDispatcher`] runs the strategy named
//!   by a signal under a 30 second deadline.
//! - **Copy trading**: [`copytrade::CopyTradeFollower`] turns a tracked
//!   wallet's fills into signals.
//!
//! ## Flow
//!
//! ```text
//! webhook / follower ──► dispatcher ──► strategy ──► signal manager ─┐
//!                                          │                         │
//!                                          ├──► trend manager        ▼
//!                                          └──► position service ◄── decision
//!                                                     │
//!                                                     ▼
//!                                                  exchange
//! ```

pub mod copytrade;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod market;
pub mod position;
pub mod signal;
pub mod strategies;
pub mod testing;

pub use dispatcher::{
    DispatchCallback, Strategy, StrategyDispatcher, StrategyMetrics, StrategyOutcome,
    DISPATCH_TIMEOUT,
};
pub use engine::{DecisionEngine, EngineDecision};
pub use error::{Result, StrategyError};
pub use market::{KlineManager, KlineManagerConfig, TrendManager};
pub use position::{InMemoryOrderStore, OrderStore, PositionService, SqliteOrderStore};
pub use signal::{SignalGate, SignalManager};
pub use strategies::{register_all, StrategyContext};
