//! Copy-trade follower: turns a tracked wallet's fills into signals

pub mod follower;

pub use follower::{CopyTradeFollower, FollowerConfig, HypeTradeSignal};
