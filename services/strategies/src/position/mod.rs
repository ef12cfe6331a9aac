//! Position lifecycle: sizing, execution and local per-level metadata

pub mod service;
pub mod sizing;
pub mod store;

pub use service::{EntryParams, PositionService};
pub use sizing::{order_size, trailing_stop, OrderSize, DEFAULT_LEVERAGE, LOCK_PROFIT_RATIO};
pub use store::{InMemoryOrderStore, OrderStore, SqliteOrderStore};
