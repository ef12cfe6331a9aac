//! Circuit breaker pattern for fault tolerance

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::{AdapterError, Venue};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failing - requests are rejected
    Open,
    /// Testing recovery - limited requests allowed
    HalfOpen,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Time to wait before attempting recovery
    pub recovery_timeout: Duration,
    /// Successes needed to close circuit from half-open
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

/// Per-venue circuit breaker shared by all calls to that venue
pub struct CircuitBreaker {
    venue: Venue,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    circuit_opens: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(venue: Venue, config: CircuitBreakerConfig) -> Self {
        Self {
            venue,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            }),
            circuit_opens: AtomicU64::new(0),
        }
    }

    /// Run `operation` unless the circuit is open. Only failures classified by
    /// [`AdapterError::trips_breaker`] count towards opening.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, AdapterError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        if !self.should_attempt() {
            return Err(AdapterError::CircuitBreakerOpen { venue: self.venue });
        }

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                if error.trips_breaker() {
                    self.on_failure();
                }
                Err(error)
            }
        }
    }

    /// Check if we should allow an operation
    pub fn should_attempt(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.failures = 0;
                    inner.successes = 0;
                    tracing::info!(venue = %self.venue, "Circuit breaker transitioning to half-open");
                }
                elapsed
            }
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    tracing::info!(venue = %self.venue, "Circuit breaker closed after {} successes", inner.successes);
                }
            }
            CircuitState::Closed => inner.failures = 0,
            CircuitState::Open => {}
        }
    }

    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failures += 1;
        let reopen = match inner.state {
            CircuitState::Closed => inner.failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if reopen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            self.circuit_opens.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(venue = %self.venue, "Circuit breaker opened after {} failures", inner.failures);
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Number of times the circuit has opened
    pub fn opens(&self) -> u64 {
        self.circuit_opens.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            Venue::Okx,
            CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: recovery,
                success_threshold: 1,
            },
        )
    }

    fn transient() -> AdapterError {
        AdapterError::ConnectionFailed {
            venue: Venue::Okx,
            reason: "reset".into(),
        }
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_rejects() {
        let cb = breaker(Duration::from_secs(60));
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>(transient()) }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let rejected = cb.call(|| async { Ok::<_, AdapterError>(1) }).await;
        assert!(matches!(rejected, Err(AdapterError::CircuitBreakerOpen { .. })));
        assert_eq!(cb.opens(), 1);
    }

    #[tokio::test]
    async fn test_half_open_recovers() {
        let cb = breaker(Duration::from_millis(0));
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>(transient()) }).await;
        }
        let ok = cb.call(|| async { Ok::<_, AdapterError>(7) }).await.unwrap();
        assert_eq!(ok, 7);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_business_errors_do_not_trip() {
        let cb = breaker(Duration::from_secs(60));
        for _ in 0..5 {
            let _ = cb
                .call(|| async {
                    Err::<(), _>(AdapterError::InvalidInstrument("FOO-USDT".into()))
                })
                .await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
