//! Rate limiting for venue API requests

use governor::{DefaultDirectRateLimiter, Quota};
use nonzero_ext::nonzero;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Groups of endpoints that share a venue-side quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// Public market data (tickers, candles, instruments)
    Market,
    /// Account reads (positions, balance, pending algos)
    Account,
    /// Order placement, amendment and leverage changes
    Trade,
}

/// Rate limiter for venue API requests
#[derive(Clone)]
pub struct RateLimiter {
    limiters: HashMap<EndpointClass, Arc<DefaultDirectRateLimiter>>,
}

impl RateLimiter {
    /// Limiter with no quotas configured
    pub fn unlimited() -> Self {
        Self {
            limiters: HashMap::new(),
        }
    }

    /// Configure requests per second for an endpoint class
    pub fn configure(&mut self, class: EndpointClass, per_second: u32) {
        match NonZeroU32::new(per_second) {
            Some(rate) => {
                let limiter = DefaultDirectRateLimiter::direct(Quota::per_second(rate));
                self.limiters.insert(class, Arc::new(limiter));
            }
            None => tracing::warn!("Ignoring zero rate limit for {:?}", class),
        }
    }

    /// Check if request is allowed (non-blocking)
    pub fn check(&self, class: EndpointClass) -> bool {
        self.limiters
            .get(&class)
            .map(|limiter| limiter.check().is_ok())
            .unwrap_or(true)
    }

    /// Wait until a request of this class is allowed
    pub async fn wait(&self, class: EndpointClass) {
        if let Some(limiter) = self.limiters.get(&class) {
            limiter.until_ready().await;
        }
    }
}

impl Default for RateLimiter {
    /// OKX v5 quotas, rounded down: candles 40/2s, account 10/2s, orders 60/2s
    fn default() -> Self {
        let mut limiter = Self::unlimited();
        limiter.limiters.insert(
            EndpointClass::Market,
            Arc::new(DefaultDirectRateLimiter::direct(Quota::per_second(nonzero!(20u32)))),
        );
        limiter.limiters.insert(
            EndpointClass::Account,
            Arc::new(DefaultDirectRateLimiter::direct(Quota::per_second(nonzero!(5u32)))),
        );
        limiter.limiters.insert(
            EndpointClass::Trade,
            Arc::new(DefaultDirectRateLimiter::direct(Quota::per_second(nonzero!(30u32)))),
        );
        limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exhaustion() {
        let mut limiter = RateLimiter::unlimited();
        limiter.configure(EndpointClass::Account, 2);
        assert!(limiter.check(EndpointClass::Account));
        assert!(limiter.check(EndpointClass::Account));
        assert!(!limiter.check(EndpointClass::Account));
        // Unconfigured classes are never limited
        assert!(limiter.check(EndpointClass::Trade));
    }
}
