//! Signal intake state and level arbitration
//!
//! Two policy surfaces live here. [`SignalManager`] is the `decide` path used
//! by the level-based strategy. [`SignalGate`] is the older `should_execute`
//! path with L3 → L2 upgrade, used by the scalp and trend strategies. They
//! keep separate state.

pub mod gate;
pub mod manager;

pub use gate::{GateVerdict, SignalGate};
pub use manager::{SignalManager, SymbolSignals};
