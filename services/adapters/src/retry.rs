//! Exponential backoff with jitter for REST retries and stream reconnects

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::AdapterError;

/// Retry settings for a single request
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
    /// capped at `max_delay`, plus up to 50% random jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(6);
        let base_ms = self.base_delay.as_millis() as u64 * 2_u64.pow(exp);
        let capped = base_ms.min(self.max_delay.as_millis() as u64);
        let jitter = if capped > 1 {
            rand::thread_rng().gen_range(0..=capped / 2)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }

    /// Run `operation`, retrying recoverable errors. The last error is
    /// surfaced once attempts are exhausted.
    pub async fn run<F, Fut, T>(&self, what: &str, mut operation: F) -> Result<T, AdapterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_recoverable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {}ms",
                        what,
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Stateful reconnect backoff for long-lived streams
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    multiplier: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            multiplier: 0,
        }
    }

    /// Next delay; grows `base * 2^n` up to `max` (n capped at 6)
    pub fn next_delay(&mut self) -> Duration {
        let backoff_ms = self.base.as_millis() as u64 * 2_u64.pow(self.multiplier);
        let capped = backoff_ms.min(self.max.as_millis() as u64);
        self.multiplier = (self.multiplier + 1).min(6);
        let jitter = rand::thread_rng().gen_range(0..=capped / 4);
        Duration::from_millis(capped + jitter)
    }

    /// Call after a successful connection
    pub fn reset(&mut self) {
        self.multiplier = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_delay_growth_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        let first = policy.delay_for(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        let late = policy.delay_for(8);
        assert!(late >= Duration::from_millis(1000) && late <= Duration::from_millis(1500));
    }

    #[test]
    fn test_backoff_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
        let a = backoff.next_delay();
        let b = backoff.next_delay();
        assert!(a < Duration::from_millis(130));
        assert!(b >= Duration::from_millis(200));
        backoff.reset();
        assert!(backoff.next_delay() < Duration::from_millis(130));
    }

    #[tokio::test]
    async fn test_retries_recoverable_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = fast_policy()
            .run("ticker", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AdapterError::ConnectionTimeout {
                            venue: crate::Venue::Okx,
                            timeout_ms: 10,
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = fast_policy()
            .run("order", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AdapterError::InvalidInstrument("X".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
