//! Routes inbound signals to the strategy registered under their name

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use types::{Action, Decision, Signal};

use crate::error::{Result, StrategyError};

/// Deadline of one `signal → decision → order` pass
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// What a strategy did with one signal
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub decision: Decision,
    /// Venue order id when an order was placed
    pub order_id: Option<String>,
}

impl StrategyOutcome {
    pub fn ignored(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::ignore(reason),
            order_id: None,
        }
    }

    pub fn new(decision: Decision, order_id: Option<String>) -> Self {
        Self { decision, order_id }
    }

    pub fn action(&self) -> Action {
        self.decision.action
    }
}

/// A trading policy reachable by name
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, signal: &Signal) -> Result<StrategyOutcome>;
}

/// Counters across all dispatches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyMetrics {
    pub signals_dispatched: u64,
    pub orders_placed: u64,
    pub ignored: u64,
    pub errors: u64,
    pub timeouts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    orders: AtomicU64,
    ignored: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
}

impl Counters {
    fn record(&self, result: &Result<StrategyOutcome>) {
        match result {
            Ok(outcome) if outcome.order_id.is_some() => {
                self.orders.fetch_add(1, Ordering::Relaxed);
            }
            Ok(outcome) if outcome.action() == Action::Ignore => {
                self.ignored.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {}
            Err(StrategyError::Timeout(_)) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

pub type DispatchCallback = Box<dyn FnOnce(Result<StrategyOutcome>) + Send + 'static>;

/// Name → strategy registry. Strategies are registered before the
/// dispatcher is shared and the map is read-only afterwards.
pub struct StrategyDispatcher {
    strategies: HashMap<String, Arc<dyn Strategy>>,
    timeout: Duration,
    counters: Arc<Counters>,
    in_flight: Mutex<JoinSet<()>>,
}

impl Default for StrategyDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyDispatcher {
    pub fn new() -> Self {
        Self::with_timeout(DISPATCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            strategies: HashMap::new(),
            timeout,
            counters: Arc::new(Counters::default()),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        let name = strategy.name().to_string();
        if self.strategies.insert(name.clone(), strategy).is_some() {
            warn!(strategy = %name, "Strategy registered twice, keeping the latest");
        } else {
            info!(strategy = %name, "Strategy registered");
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn metrics(&self) -> StrategyMetrics {
        StrategyMetrics {
            signals_dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            orders_placed: self.counters.orders.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
        }
    }

    fn lookup(&self, signal: &Signal) -> Result<Arc<dyn Strategy>> {
        self.strategies
            .get(&signal.strategy)
            .cloned()
            .ok_or_else(|| StrategyError::UnknownStrategy(signal.strategy.clone()))
    }

    /// Run `signal` on its own task under the dispatch deadline and hand the
    /// result to `callback`. An unknown strategy is reported to `callback`
    /// directly.
    pub fn dispatch(&self, signal: Signal, callback: DispatchCallback) {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        let strategy = match self.lookup(&signal) {
            Ok(strategy) => strategy,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                callback(Err(e));
                return;
            }
        };

        let timeout = self.timeout;
        let counters = self.counters.clone();
        let mut in_flight = self.in_flight.lock();
        // Reap finished dispatches so the set stays small
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move {
            let result = run_with_deadline(strategy.as_ref(), &signal, timeout).await;
            counters.record(&result);
            callback(result);
        });
    }

    /// Run `signal` on the calling task under the dispatch deadline
    pub async fn dispatch_inline(&self, signal: &Signal) -> Result<StrategyOutcome> {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        let result = match self.lookup(signal) {
            Ok(strategy) => run_with_deadline(strategy.as_ref(), signal, self.timeout).await,
            Err(e) => Err(e),
        };
        self.counters.record(&result);
        result
    }

    /// Wait up to `grace` for in-flight dispatches; the rest are aborted
    pub async fn drain(&self, grace: Duration) {
        let mut tasks = std::mem::take(&mut *self.in_flight.lock());
        let pending = tasks.len();
        if pending == 0 {
            return;
        }
        info!(pending, "Draining in-flight dispatches");

        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "Dispatch drain timed out, aborting");
            tasks.abort_all();
        }
    }
}

async fn run_with_deadline(
    strategy: &dyn Strategy,
    signal: &Signal,
    timeout: Duration,
) -> Result<StrategyOutcome> {
    debug!(
        strategy = strategy.name(),
        symbol = %signal.symbol,
        level = %signal.level,
        side = %signal.side,
        "Dispatching signal"
    );
    match tokio::time::timeout(timeout, strategy.execute(signal)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                strategy = strategy.name(),
                symbol = %signal.symbol,
                "Strategy timed out after {:?}",
                timeout
            );
            Err(StrategyError::Timeout(timeout))
        }
    }
}
