//! # Venue Adapters
//!
//! ## Purpose
//!
//! Boundary between the dispatcher core and the outside venues:
//!
//! - **Derivatives exchange**: the [`Exchange`] capability set (quotes,
//!   candles, positions, orders, leverage, close) and its OKX v5 REST
//!   implementation [`okx::OkxExchange`].
//! - **Copy-trade venue**: the Hyperliquid WebSocket reader
//!   ([`hyperliquid::HyperliquidStream`]) and account-state REST client
//!   ([`hyperliquid::HyperliquidInfo`]).
//!
//! ## Resilience
//!
//! Every REST call passes a per-endpoint-class [`RateLimiter`], a
//! [`CircuitBreaker`] and a jittered [`RetryPolicy`]. Errors are classified
//! by [`AdapterError::is_recoverable`]; only recoverable ones are retried.
//! Account queries carry their own 5 second deadline.

pub mod circuit_breaker;
pub mod error;
pub mod exchange;
pub mod hyperliquid;
pub mod okx;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{AdapterError, Result};
pub use exchange::{ClosePosition, Exchange, KlineQuery, PositionPair};
pub use rate_limit::{EndpointClass, RateLimiter};
pub use retry::{Backoff, RetryPolicy};

use std::fmt;

/// External venue an adapter talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    Okx,
    Hyperliquid,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::Okx => f.write_str("okx"),
            Venue::Hyperliquid => f.write_str("hyperliquid"),
        }
    }
}
