//! Process wiring: builds the component graph from [`AppConfig`], starts
//! the long-lived tasks and coordinates shutdown

use adapter_service::hyperliquid::{HyperliquidInfo, HyperliquidStream, StreamConfig};
use adapter_service::okx::{Credentials, OkxClient, OkxClientConfig, OkxExchange};
use adapter_service::Exchange;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use strategies::copytrade::{CopyTradeFollower, FollowerConfig};
use strategies::{
    register_all, InMemoryOrderStore, KlineManager, KlineManagerConfig, OrderStore,
    PositionService, SignalManager, SqliteOrderStore, StrategyContext, StrategyDispatcher,
    StrategyOutcome, TrendManager,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use trader_config::AppConfig;
use types::Signal;

use crate::webhook::{self, WebhookState, QUEUE_CAPACITY};

/// Grace period for in-flight dispatches on shutdown
pub const DRAIN_GRACE: Duration = Duration::from_secs(30);

const HYPERLIQUID_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_BUFFER: usize = 1024;

/// Everything the running process shares
pub struct Components {
    pub exchange: Arc<dyn Exchange>,
    pub klines: Arc<KlineManager>,
    pub trends: Arc<TrendManager>,
    pub context: StrategyContext,
    pub dispatcher: Arc<StrategyDispatcher>,
}

impl Components {
    /// Wire the pipeline over `exchange` and `store`
    pub fn build(
        config: &AppConfig,
        exchange: Arc<dyn Exchange>,
        store: Arc<dyn OrderStore>,
    ) -> Self {
        let kline_config = KlineManagerConfig {
            backfill_attempts: config.klines.backfill_attempts,
            backfill_retry_delay: Duration::from_millis(config.klines.backfill_retry_ms),
            ..KlineManagerConfig::new(config.klines.symbols.clone(), config.klines.limit)
        };
        let klines = Arc::new(KlineManager::new(exchange.clone(), kline_config));
        let trends = Arc::new(TrendManager::new(klines.clone()));
        let positions = Arc::new(
            PositionService::new(exchange.clone(), store).with_margin_mode(config.okx.margin_mode),
        );
        let signals = Arc::new(SignalManager::new(config.strategy.clone()));
        let context = StrategyContext::new(signals, trends.clone(), positions);

        let mut dispatcher = StrategyDispatcher::new();
        register_all(&mut dispatcher, &context, &config.copytrade.strategy);
        info!(strategies = ?dispatcher.names(), "Strategies registered");

        Self {
            exchange,
            klines,
            trends,
            context,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Backfill every K-line window and compute the first trend states.
    /// A symbol left without data is fatal.
    pub async fn prime(&self) -> Result<()> {
        self.klines
            .backfill()
            .await
            .context("initial K-line backfill failed")?;
        self.trends.refresh();
        Ok(())
    }
}

fn okx_exchange(config: &AppConfig) -> Result<Arc<dyn Exchange>> {
    let credentials = (!config.okx.api_key.is_empty()).then(|| Credentials {
        api_key: config.okx.api_key.clone(),
        secret_key: config.okx.secret_key.clone(),
        passphrase: config.okx.password.clone(),
    });
    if credentials.is_none() {
        warn!("No OKX API key configured; account and trade calls will fail");
    }

    let client = OkxClient::new(OkxClientConfig {
        base_url: config.okx.base_url.clone(),
        credentials,
        simulated: config.simulated,
        ..Default::default()
    })
    .context("failed to build OKX client")?;
    Ok(Arc::new(OkxExchange::new(client)))
}

fn order_store(config: &AppConfig) -> Result<Arc<dyn OrderStore>> {
    match &config.database.path {
        Some(path) => {
            let store = SqliteOrderStore::open(path)
                .with_context(|| format!("failed to open order store at {path:?}"))?;
            info!(?path, "Order records persisted to SQLite");
            Ok(Arc::new(store))
        }
        None => {
            warn!("database.path not set, order records kept in memory");
            Ok(Arc::new(InMemoryOrderStore::new()))
        }
    }
}

fn log_outcome(signal: &Signal, result: strategies::Result<StrategyOutcome>) {
    match result {
        Ok(outcome) => info!(
            strategy = %signal.strategy,
            symbol = %signal.symbol,
            action = %outcome.decision.action,
            order_id = ?outcome.order_id,
            "Dispatch finished: {}",
            outcome.decision.reason
        ),
        Err(e) => error!(
            strategy = %signal.strategy,
            symbol = %signal.symbol,
            "Dispatch failed: {}",
            e
        ),
    }
}

/// Hand every queued signal to the dispatcher until shutdown
pub async fn consume_signals(
    dispatcher: Arc<StrategyDispatcher>,
    mut signals: mpsc::Receiver<Signal>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            signal = signals.recv() => {
                let Some(signal) = signal else { break };
                let context = signal.clone();
                dispatcher.dispatch(signal, Box::new(move |result| log_outcome(&context, result)));
            }
        }
    }
    info!("Signal consumer stopped");
}

/// Run until Ctrl-C
pub async fn run(config: AppConfig) -> Result<()> {
    let exchange = okx_exchange(&config)?;
    let store = order_store(&config)?;
    let components = Components::build(&config, exchange, store);
    components.prime().await?;

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let (signal_tx, signal_rx) = mpsc::channel::<Signal>(QUEUE_CAPACITY);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Market data refreshes on aligned ticks
    let trends = components.trends.clone();
    tasks.push(tokio::spawn(components.klines.clone().run_scheduled(
        move || trends.refresh(),
        shutdown_tx.subscribe(),
    )));

    tasks.push(tokio::spawn(consume_signals(
        components.dispatcher.clone(),
        signal_rx,
        shutdown_tx.subscribe(),
    )));

    if config.copytrade.enabled {
        let info = HyperliquidInfo::new(config.copytrade.info_url.clone(), HYPERLIQUID_TIMEOUT)
            .context("failed to build Hyperliquid info client")?;
        let (events_tx, events_rx) = mpsc::channel(STREAM_BUFFER);

        let stream = HyperliquidStream::new(StreamConfig::new(
            config.copytrade.ws_url.clone(),
            config.copytrade.address.clone(),
        ));
        let stream_shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = stream.run(events_tx, stream_shutdown).await {
                error!("Hyperliquid stream failed: {}", e);
            }
        }));

        let follower = Arc::new(CopyTradeFollower::new(FollowerConfig::from(&config.copytrade)));
        tasks.push(tokio::spawn(follower.run(
            info,
            events_rx,
            signal_tx.clone(),
            shutdown_tx.subscribe(),
        )));
    }

    let addr: SocketAddr = config
        .webhook_addr()
        .parse()
        .with_context(|| format!("invalid webhook address {}", config.webhook_addr()))?;
    let state = WebhookState::new(
        config.webhook.secret.clone().into_bytes(),
        components.dispatcher.names(),
        signal_tx,
    );
    let mut server_shutdown = shutdown_tx.subscribe();
    let (bound, server) = warp::serve(webhook::routes(state))
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = server_shutdown.recv().await;
        })
        .with_context(|| format!("failed to bind webhook listener on {addr}"))?;
    info!("Webhook listening on http://{}", bound);
    tasks.push(tokio::spawn(server));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(());
    components.dispatcher.drain(DRAIN_GRACE).await;

    for task in tasks {
        if let Err(e) = task.await {
            warn!("Task ended abnormally: {}", e);
        }
    }

    let metrics = components.dispatcher.metrics();
    info!(
        dispatched = metrics.signals_dispatched,
        orders = metrics.orders_placed,
        ignored = metrics.ignored,
        errors = metrics.errors,
        timeouts = metrics.timeouts,
        "Dispatcher stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal_macros::dec;
    use strategies::testing::{trending_klines, MockExchange};
    use types::{Side, SignalLevel, TimePeriod};

    const YAML: &str = "webhook:\n  secret: \"k\"\nklines:\n  symbols: [\"BTC/USDT\"]\n  limit: 250\n";

    #[tokio::test]
    async fn test_queued_signal_reaches_exchange() {
        let config = AppConfig::from_yaml_str(YAML).unwrap();
        let mock = Arc::new(MockExchange::new());
        mock.set_price("BTC/USDT", dec!(100000));
        let components = Components::build(
            &config,
            mock.clone(),
            Arc::new(InMemoryOrderStore::new()),
        );
        assert!(components.dispatcher.contains("tv-level"));
        assert!(components.dispatcher.contains("hype-copy"));

        let (shutdown_tx, _) = broadcast::channel(1);
        let (tx, rx) = mpsc::channel(8);
        let consumer = tokio::spawn(consume_signals(
            components.dispatcher.clone(),
            rx,
            shutdown_tx.subscribe(),
        ));

        tx.send(Signal::new(
            "tv-level",
            "BTC/USDT",
            Side::Buy,
            SignalLevel::L2,
            dec!(100000),
            Utc::now() - ChronoDuration::seconds(5),
        ))
        .await
        .unwrap();
        drop(tx);
        consumer.await.unwrap();
        components.dispatcher.drain(Duration::from_secs(5)).await;

        assert_eq!(mock.orders().len(), 1);
        assert_eq!(components.dispatcher.metrics().orders_placed, 1);
    }

    #[tokio::test]
    async fn test_startup_fails_when_backfill_finds_no_data() {
        let yaml = format!("{YAML}  backfill_attempts: 1\n  backfill_retry_ms: 1\n");
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        let mock = Arc::new(MockExchange::new());
        for period in TimePeriod::ALL {
            mock.fail_klines("BTC/USDT", period, true);
        }
        let components = Components::build(
            &config,
            mock.clone(),
            Arc::new(InMemoryOrderStore::new()),
        );

        let err = components.prime().await.unwrap_err();
        assert!(err.to_string().contains("backfill"));
        assert!(components.trends.state("BTC/USDT").is_none());
    }

    #[tokio::test]
    async fn test_prime_publishes_trend_state() {
        let config = AppConfig::from_yaml_str(YAML).unwrap();
        let mock = Arc::new(MockExchange::new());
        for period in TimePeriod::ALL {
            mock.set_klines("BTC/USDT", period, trending_klines(260, 1000.0, 1.0, period));
        }
        let components = Components::build(
            &config,
            mock.clone(),
            Arc::new(InMemoryOrderStore::new()),
        );

        components.prime().await.unwrap();
        assert!(components.trends.state("BTC/USDT").is_some());
    }
}
