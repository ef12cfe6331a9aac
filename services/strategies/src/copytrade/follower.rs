use adapter_service::hyperliquid::{HyperliquidInfo, OrderUpdate, StreamEvent, WalletPosition};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use trader_config::CopyTradeConfig;
use types::{OrderType, PositionSide, Side, Signal, SignalLevel, TradeType};

use crate::strategies::copy::WALLET_SIDE_KEY;

#[derive(Debug, Clone)]
pub struct FollowerConfig {
    pub address: String,
    /// Upper-case coins to follow; empty follows every coin
    pub allowed_coins: HashSet<String>,
    pub strategy: String,
    pub default_leverage: u32,
    pub poll_interval: Duration,
}

impl From<&CopyTradeConfig> for FollowerConfig {
    fn from(config: &CopyTradeConfig) -> Self {
        Self {
            address: config.address.clone(),
            allowed_coins: config
                .allowed_coins
                .iter()
                .map(|c| c.trim().to_uppercase())
                .collect(),
            strategy: config.strategy.clone(),
            default_leverage: config.default_leverage,
            poll_interval: Duration::from_secs(config.poll_secs.max(1)),
        }
    }
}

/// One filled order of the tracked wallet
#[derive(Debug, Clone, PartialEq)]
pub struct HypeTradeSignal {
    pub coin: String,
    pub symbol: String,
    pub action: Side,
    pub price: Decimal,
    pub size: Decimal,
    /// Tracked wallet's position on the coin after the fill, if any
    pub wallet_side: Option<PositionSide>,
    pub leverage: u32,
    pub timestamp: DateTime<Utc>,
}

impl HypeTradeSignal {
    /// Level-2 swap market signal for the copy strategy
    pub fn into_signal(self, strategy: &str) -> Signal {
        let mut signal = Signal::new(
            strategy,
            self.symbol,
            self.action,
            SignalLevel::L2,
            self.price,
            self.timestamp,
        );
        signal.order_type = OrderType::Market;
        signal.trade_type = TradeType::Swap;
        signal.leverage = self.leverage;
        signal.quantity = self.size;
        signal.comment = format!("copy {}", self.coin);
        if let Some(side) = self.wallet_side {
            signal
                .meta
                .insert(WALLET_SIDE_KEY.to_string(), Value::from(side.as_str()));
        }
        signal
    }
}

/// Keeps the latest mid prices and wallet positions and emits a signal per
/// filled order
pub struct CopyTradeFollower {
    config: FollowerConfig,
    mids: RwLock<HashMap<String, Decimal>>,
    wallet: RwLock<HashMap<String, WalletPosition>>,
}

impl CopyTradeFollower {
    pub fn new(config: FollowerConfig) -> Self {
        Self {
            config,
            mids: RwLock::new(HashMap::new()),
            wallet: RwLock::new(HashMap::new()),
        }
    }

    pub fn update_mids(&self, mids: HashMap<String, Decimal>) {
        self.mids.write().extend(mids);
    }

    pub fn set_wallet_positions(&self, positions: HashMap<String, WalletPosition>) {
        *self.wallet.write() = positions;
    }

    pub fn mid(&self, coin: &str) -> Option<Decimal> {
        self.mids.read().get(coin).copied()
    }

    fn allowed(&self, coin: &str) -> bool {
        self.config.allowed_coins.is_empty()
            || self.config.allowed_coins.contains(&coin.to_uppercase())
    }

    /// Signal for `update`, or `None` when it is not a fill of a followed coin
    pub fn signal_for(&self, update: &OrderUpdate) -> Option<HypeTradeSignal> {
        if !update.is_filled() {
            return None;
        }
        let coin = update.order.coin.as_str();
        if !self.allowed(coin) {
            debug!(coin, "Ignoring fill of unfollowed coin");
            return None;
        }

        let price = match self.mid(coin) {
            Some(mid) => mid,
            None => match Decimal::from_str(&update.order.limit_px) {
                Ok(px) => px,
                Err(_) => {
                    warn!(coin, px = %update.order.limit_px, "Fill without usable price");
                    return None;
                }
            },
        };

        let (wallet_side, leverage) = match self.wallet.read().get(coin) {
            Some(position) => (
                Some(if position.is_long() {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                }),
                position.leverage.unwrap_or(self.config.default_leverage),
            ),
            None => (None, self.config.default_leverage),
        };

        let millis = update.status_timestamp.max(update.order.timestamp) as i64;
        Some(HypeTradeSignal {
            coin: coin.to_string(),
            symbol: format!("{}/USDT", coin.to_uppercase()),
            action: if update.is_buy() { Side::Buy } else { Side::Sell },
            price,
            size: Decimal::from_str(&update.order.sz).unwrap_or_default(),
            wallet_side,
            leverage,
            timestamp: Utc
                .timestamp_millis_opt(millis)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }

    /// Apply one stream event, returning the signals it produced
    pub fn handle_event(&self, event: StreamEvent) -> Vec<Signal> {
        match event {
            StreamEvent::Mids(mids) => {
                self.update_mids(mids);
                Vec::new()
            }
            StreamEvent::OrderUpdates(updates) => updates
                .iter()
                .filter_map(|u| self.signal_for(u))
                .map(|hype| {
                    info!(
                        coin = %hype.coin,
                        action = %hype.action,
                        price = %hype.price,
                        wallet = ?hype.wallet_side,
                        "Copy-trade fill"
                    );
                    hype.into_signal(&self.config.strategy)
                })
                .collect(),
        }
    }

    async fn refresh_wallet(&self, info: &HyperliquidInfo) {
        match info.wallet_positions(&self.config.address).await {
            Ok(positions) => {
                debug!(positions = positions.len(), "Wallet positions refreshed");
                self.set_wallet_positions(positions);
            }
            Err(e) => warn!("Wallet position refresh failed: {}", e),
        }
    }

    /// Consume stream events and forward signals until shutdown. Wallet
    /// positions are polled every `poll_interval`.
    pub async fn run(
        self: Arc<Self>,
        info: HyperliquidInfo,
        mut events: mpsc::Receiver<StreamEvent>,
        signals: mpsc::Sender<Signal>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        self.refresh_wallet(&info).await;
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.tick().await;

        info!(address = %self.config.address, "Copy-trade follower started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = poll.tick() => self.refresh_wallet(&info).await,
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Copy-trade stream closed");
                        break;
                    };
                    for signal in self.handle_event(event) {
                        if signals.send(signal).await.is_err() {
                            warn!("Signal queue closed, stopping follower");
                            return;
                        }
                    }
                }
            }
        }
        info!("Copy-trade follower stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_service::hyperliquid::BasicOrder;
    use rust_decimal_macros::dec;

    fn follower(coins: &[&str]) -> CopyTradeFollower {
        CopyTradeFollower::new(FollowerConfig {
            address: "0xabc".into(),
            allowed_coins: coins.iter().map(|c| c.to_string()).collect(),
            strategy: "hype-copy".into(),
            default_leverage: 20,
            poll_interval: Duration::from_secs(30),
        })
    }

    fn update(coin: &str, side: &str, status: &str) -> OrderUpdate {
        OrderUpdate {
            order: BasicOrder {
                coin: coin.into(),
                side: side.into(),
                limit_px: "32.10".into(),
                sz: "1.2".into(),
                oid: 7,
                timestamp: 1_754_870_000_000,
                orig_sz: "1.2".into(),
            },
            status: status.into(),
            status_timestamp: 1_754_870_000_500,
        }
    }

    #[test]
    fn test_fill_uses_mid_and_wallet() {
        let f = follower(&["HYPE"]);
        f.update_mids(HashMap::from([("HYPE".to_string(), dec!(32.40))]));
        f.set_wallet_positions(HashMap::from([(
            "HYPE".to_string(),
            WalletPosition {
                coin: "HYPE".into(),
                size: dec!(1.2),
                leverage: Some(10),
                entry_price: Some(dec!(30)),
            },
        )]));

        let hype = f.signal_for(&update("HYPE", "B", "filled")).unwrap();
        assert_eq!(hype.symbol, "HYPE/USDT");
        assert_eq!(hype.price, dec!(32.40));
        assert_eq!(hype.action, Side::Buy);
        assert_eq!(hype.wallet_side, Some(PositionSide::Long));
        assert_eq!(hype.leverage, 10);

        let signal = hype.into_signal("hype-copy");
        assert_eq!(signal.level, SignalLevel::L2);
        assert_eq!(signal.trade_type, TradeType::Swap);
        assert_eq!(signal.meta.get(WALLET_SIDE_KEY), Some(&Value::from("long")));
    }

    #[test]
    fn test_filters_status_and_coin() {
        let f = follower(&["HYPE"]);
        assert!(f.signal_for(&update("HYPE", "B", "open")).is_none());
        assert!(f.signal_for(&update("BTC", "B", "filled")).is_none());
    }

    #[test]
    fn test_falls_back_to_limit_price_and_default_leverage() {
        let f = follower(&[]);
        let hype = f.signal_for(&update("SOL", "A", "filled")).unwrap();
        assert_eq!(hype.price, dec!(32.10));
        assert_eq!(hype.action, Side::Sell);
        assert_eq!(hype.wallet_side, None);
        assert_eq!(hype.leverage, 20);
    }

    #[test]
    fn test_handle_event_emits_only_fills() {
        let f = follower(&["HYPE"]);
        assert!(f
            .handle_event(StreamEvent::Mids(HashMap::from([("HYPE".into(), dec!(33))])))
            .is_empty());
        let signals = f.handle_event(StreamEvent::OrderUpdates(vec![
            update("HYPE", "B", "filled"),
            update("HYPE", "B", "canceled"),
        ]));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].price, dec!(33));
        assert_eq!(signals[0].strategy, "hype-copy");
    }
}
