//! Multi-timeframe K-line cache with an aligned refresh schedule
//!
//! One task owns refreshes; readers take cheap `Arc` snapshots of a window
//! under the read lock. Fetches for one symbol run one period at a time.

use adapter_service::{Exchange, KlineQuery};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use types::{Kline, TimePeriod, TradeType};

use crate::error::{Result, StrategyError};
use crate::market::schedule::{next_tick, periods_due};

/// Ascending, bounded candle window shared with readers
pub type KlineWindow = Arc<Vec<Kline>>;

#[derive(Debug, Clone)]
pub struct KlineManagerConfig {
    pub symbols: Vec<String>,
    pub periods: Vec<TimePeriod>,
    /// Window length per `(symbol, period)`
    pub limit: usize,
    pub trade_type: TradeType,
    pub backfill_attempts: u32,
    pub backfill_retry_delay: Duration,
}

impl KlineManagerConfig {
    pub fn new(symbols: Vec<String>, limit: usize) -> Self {
        Self {
            symbols,
            periods: TimePeriod::ALL.to_vec(),
            limit,
            trade_type: TradeType::Swap,
            backfill_attempts: 3,
            backfill_retry_delay: Duration::from_secs(2),
        }
    }
}

pub struct KlineManager {
    exchange: Arc<dyn Exchange>,
    config: KlineManagerConfig,
    cache: RwLock<HashMap<String, HashMap<TimePeriod, KlineWindow>>>,
}

impl KlineManager {
    pub fn new(exchange: Arc<dyn Exchange>, config: KlineManagerConfig) -> Self {
        Self {
            exchange,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.config.symbols
    }

    pub fn get(&self, symbol: &str, period: TimePeriod) -> Option<KlineWindow> {
        self.cache.read().get(symbol)?.get(&period).cloned()
    }

    /// All cached windows of `symbol`
    pub fn windows(&self, symbol: &str) -> HashMap<TimePeriod, KlineWindow> {
        self.cache.read().get(symbol).cloned().unwrap_or_default()
    }

    /// Replace a window directly; used by internal producers and tests
    pub fn insert(&self, symbol: &str, period: TimePeriod, klines: Vec<Kline>) {
        let mut window = klines;
        if window.len() > self.config.limit {
            window.drain(..window.len() - self.config.limit);
        }
        self.cache
            .write()
            .entry(symbol.to_string())
            .or_default()
            .insert(period, Arc::new(window));
    }

    /// Fetch one window and replace the cached copy. The cache is untouched
    /// on failure.
    pub async fn refresh(&self, symbol: &str, period: TimePeriod) -> Result<usize> {
        let query = KlineQuery {
            symbol: symbol.to_string(),
            period,
            limit: self.config.limit,
            since: None,
            trade_type: self.config.trade_type,
            sorted: true,
        };
        let klines = self.exchange.kline_records(&query).await?;
        if klines.is_empty() {
            return Err(StrategyError::Backfill {
                symbol: symbol.to_string(),
                message: format!("exchange returned no {period} candles"),
            });
        }
        let count = klines.len();
        self.insert(symbol, period, klines);
        debug!("Refreshed {} {} ({} candles)", symbol, period, count);
        Ok(count)
    }

    /// Fill every tracked window. Fails when a symbol ends with no window at
    /// all after the configured attempts.
    pub async fn backfill(&self) -> Result<()> {
        for symbol in &self.config.symbols {
            for period in &self.config.periods {
                let mut attempt = 1;
                loop {
                    match self.refresh(symbol, *period).await {
                        Ok(_) => break,
                        Err(e) if attempt < self.config.backfill_attempts => {
                            warn!(
                                "Backfill {} {} failed (attempt {}): {}",
                                symbol, period, attempt, e
                            );
                            attempt += 1;
                            tokio::time::sleep(self.config.backfill_retry_delay).await;
                        }
                        Err(e) => {
                            warn!("Backfill {} {} gave up: {}", symbol, period, e);
                            break;
                        }
                    }
                }
            }

            if self.windows(symbol).is_empty() {
                return Err(StrategyError::Backfill {
                    symbol: symbol.clone(),
                    message: "no window could be fetched".to_string(),
                });
            }
        }
        info!(
            "Backfilled {} symbols x {} periods",
            self.config.symbols.len(),
            self.config.periods.len()
        );
        Ok(())
    }

    /// Refresh `periods` for every symbol; failures keep the old window
    pub async fn tick(&self, periods: &[TimePeriod]) {
        for symbol in &self.config.symbols {
            for period in periods.iter().filter(|p| self.config.periods.contains(p)) {
                if let Err(e) = self.refresh(symbol, *period).await {
                    warn!("Refresh {} {} failed, keeping previous window: {}", symbol, period, e);
                }
            }
        }
    }

    /// Refresh on every aligned tick until shutdown, calling `on_update`
    /// exactly once per tick. Run [`backfill`](Self::backfill) first.
    pub async fn run_scheduled<F>(
        self: Arc<Self>,
        mut on_update: F,
        mut shutdown: broadcast::Receiver<()>,
    ) where
        F: FnMut() + Send,
    {
        loop {
            let now = Utc::now();
            let tick = next_tick(now);
            let wait = (tick - now).to_std().unwrap_or(Duration::ZERO);
            debug!("Next K-line tick at {}", tick);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.recv() => {
                    info!("K-line scheduler stopped");
                    return;
                }
            }

            let due = periods_due(tick);
            info!(
                "K-line tick {}: refreshing {:?}",
                tick.format("%H:%M:%S"),
                due.iter().map(|p| p.as_str()).collect::<Vec<_>>()
            );
            self.tick(&due).await;
            on_update();
        }
    }
}
