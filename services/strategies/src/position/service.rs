use adapter_service::{AdapterError, ClosePosition, Exchange};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::{
    Action, Decision, LocalPositionMeta, MarginMode, OrderRecord, OrderRequest, OrderType,
    PositionInfo, Side, Signal, SignalLevel, TradeType,
};

use super::sizing::{
    effective_leverage, level_default_pct, order_size, reduce_amount, stop_loss_price,
    take_profit_price, trailing_stop, LOCK_PROFIT_RATIO,
};
use super::store::OrderStore;
use crate::error::{Result, StrategyError};

const QUOTE_CURRENCY: &str = "USDT";

/// Share of a position shed by a `Reduce` without an explicit percentage
const DEFAULT_REDUCE_PERCENT: f64 = 0.5;

/// Position fraction applied on top of each entry's base size
const ENTRY_SCALE: f64 = 0.3;

/// TP/SL percentages and balance share of one entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryParams {
    pub tp_pct: f64,
    pub sl_pct: f64,
    pub size_pct: f64,
}

impl EntryParams {
    pub const fn new(tp_pct: f64, sl_pct: f64, size_pct: f64) -> Self {
        Self {
            tp_pct,
            sl_pct,
            size_pct,
        }
    }

    /// Entry parameters of an opening or adding action
    pub fn for_action(action: Action) -> Option<Self> {
        match action {
            Action::Open => Some(Self::new(0.8, 0.9, 0.21 * ENTRY_SCALE)),
            Action::OpenSmall => Some(Self::new(0.7, 0.8, 0.15 * ENTRY_SCALE)),
            Action::Add => Some(Self::new(1.0, 1.0, 0.18 * ENTRY_SCALE)),
            Action::AddSmall => Some(Self::new(0.9, 0.9, 0.13 * ENTRY_SCALE)),
            Action::Ignore | Action::Reduce | Action::TightenSL | Action::Close => None,
        }
    }
}

/// Executes actions on the exchange and owns the local per-level metadata.
///
/// One mutex guards the metadata map; exchange calls happen outside it and
/// metadata only changes after the exchange confirmed the order.
pub struct PositionService {
    exchange: Arc<dyn Exchange>,
    store: Arc<dyn OrderStore>,
    margin_mode: MarginMode,
    metas: Mutex<HashMap<String, HashMap<SignalLevel, LocalPositionMeta>>>,
}

impl PositionService {
    pub fn new(exchange: Arc<dyn Exchange>, store: Arc<dyn OrderStore>) -> Self {
        Self {
            exchange,
            store,
            margin_mode: MarginMode::Cross,
            metas: Mutex::new(HashMap::new()),
        }
    }

    /// Margin mode used when opening derivatives positions
    pub fn with_margin_mode(mut self, margin_mode: MarginMode) -> Self {
        self.margin_mode = margin_mode;
        self
    }

    pub fn exchange(&self) -> &Arc<dyn Exchange> {
        &self.exchange
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Open or add on `signal.side`. A zero `size_pct` falls back to the
    /// level default share of the balance.
    pub async fn open(
        &self,
        signal: &Signal,
        tp_pct: f64,
        sl_pct: f64,
        size_pct: f64,
    ) -> Result<String> {
        let position_side = signal
            .side
            .position_side()
            .ok_or_else(|| StrategyError::invalid_signal("cannot open on a hold signal"))?;

        let reference_price = if signal.price > Decimal::ZERO {
            signal.price
        } else {
            self.exchange.last_price(&signal.symbol).await?
        };

        let size_pct = if size_pct > 0.0 {
            size_pct
        } else {
            level_default_pct(signal.level)
        };
        let leverage = effective_leverage(signal.leverage);
        let margin_mode = self.margin_mode;

        let available = self.exchange.available_balance(QUOTE_CURRENCY).await?;
        let multiplier = self
            .exchange
            .contract_multiplier(&signal.symbol, signal.trade_type)
            .await?;
        let size = order_size(available, size_pct, leverage, reference_price, multiplier)?;

        if signal.trade_type != TradeType::Spot {
            self.exchange
                .set_leverage(&signal.symbol, leverage, margin_mode, position_side)
                .await?;
        }

        let take_profit = take_profit_price(reference_price, signal.side, tp_pct);
        let stop_loss = stop_loss_price(reference_price, signal.side, sl_pct);
        let order = OrderRequest {
            symbol: signal.symbol.clone(),
            side: signal.side,
            order_type: signal.order_type,
            trade_type: signal.trade_type,
            price: match signal.order_type {
                OrderType::Market => Decimal::ZERO,
                OrderType::Limit => signal.price,
            },
            size: size.contracts,
            take_profit,
            stop_loss,
            margin_mode,
            position_side,
            leverage,
            reduce_only: false,
        };

        let order_id = self.exchange.place_order(&order).await?;
        info!(
            symbol = %signal.symbol,
            side = %signal.side,
            level = %signal.level,
            contracts = %size.contracts,
            price = %reference_price,
            %order_id,
            "Position opened"
        );

        self.metas
            .lock()
            .entry(signal.symbol.clone())
            .or_default()
            .insert(
                signal.level,
                LocalPositionMeta {
                    symbol: signal.symbol.clone(),
                    level: signal.level,
                    side: signal.side,
                    entry_price: reference_price,
                    size: size.contracts,
                    open_time: Utc::now(),
                },
            );

        self.persist(OrderRecord {
            id: None,
            order_id: order_id.clone(),
            symbol: signal.symbol.clone(),
            created_at: Utc::now(),
            side: signal.side,
            price: reference_price,
            quantity: size.contracts,
            order_type: signal.order_type,
            tp: take_profit,
            sl: stop_loss,
            strategy: signal.strategy.clone(),
            comment: signal.comment.clone(),
            trade_type: signal.trade_type,
            mgn_mode: margin_mode,
            leverage,
            timestamp: signal.timestamp,
            level: signal.level.as_u8(),
            score: signal.score,
        })
        .await;

        Ok(order_id)
    }

    /// Close all of `position`. Metadata is left to the caller.
    pub async fn close(&self, position: &PositionInfo, trade_type: TradeType) -> Result<String> {
        self.close_amount(position, position.amount, trade_type, None)
            .await
    }

    async fn close_amount(
        &self,
        position: &PositionInfo,
        amount: Decimal,
        trade_type: TradeType,
        origin: Option<&Signal>,
    ) -> Result<String> {
        let request = ClosePosition {
            amount,
            ..ClosePosition::full(position, trade_type)
        };
        let order_id = self.exchange.close_position(&request).await?;
        info!(
            symbol = %position.symbol,
            direction = %position.direction,
            %amount,
            %order_id,
            "Position closed"
        );

        self.persist(OrderRecord {
            id: None,
            order_id: order_id.clone(),
            symbol: position.symbol.clone(),
            created_at: Utc::now(),
            side: position.direction.closing_side(),
            price: position.mark_price,
            quantity: amount,
            order_type: OrderType::Market,
            tp: None,
            sl: None,
            strategy: origin.map_or_else(|| "close".to_string(), |s| s.strategy.clone()),
            comment: origin.map(|s| s.comment.clone()).unwrap_or_default(),
            trade_type,
            mgn_mode: position.margin_mode,
            leverage: position.leverage,
            timestamp: origin.map_or_else(Utc::now, |s| s.timestamp),
            level: origin.map_or(0, |s| s.level.as_u8()),
            score: origin.map_or(0.0, |s| s.score),
        })
        .await;

        Ok(order_id)
    }

    /// Close both sides of `symbol` and drop its metadata
    pub async fn close_all(&self, symbol: &str, trade_type: TradeType) -> Result<Vec<String>> {
        let pair = match self.exchange.position(symbol, trade_type).await {
            Ok(pair) => pair,
            Err(AdapterError::NotSupported(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut order_ids = Vec::new();
        for position in [pair.long, pair.short].into_iter().flatten() {
            order_ids.push(self.close(&position, trade_type).await?);
        }
        self.clear_meta(symbol);
        Ok(order_ids)
    }

    /// Exchange position and local metadata for `signal`'s symbol and level.
    ///
    /// A flat exchange clears every local meta of the symbol. A live
    /// position without an L2 meta gets one synthesized from the snapshot.
    pub async fn state(
        &self,
        signal: &Signal,
    ) -> Result<(Option<PositionInfo>, Option<LocalPositionMeta>)> {
        let pair = match self.exchange.position(&signal.symbol, signal.trade_type).await {
            Ok(pair) => pair,
            Err(AdapterError::NotSupported(_)) => {
                return Ok((None, self.get_position_by_level(&signal.symbol, signal.level)));
            }
            Err(e) => return Err(e.into()),
        };

        if pair.is_flat() {
            let had_meta = self
                .metas
                .lock()
                .remove(&signal.symbol)
                .is_some_and(|m| !m.is_empty());
            if had_meta {
                warn!(symbol = %signal.symbol, "Exchange reports no position, clearing local metadata");
            }
            return Ok((None, None));
        }

        let mut metas = self.metas.lock();
        let levels = metas.entry(signal.symbol.clone()).or_default();

        // Prefer the side this level's meta tracks, then the L2 side
        let tracked_side = levels
            .get(&signal.level)
            .or_else(|| levels.get(&SignalLevel::L2))
            .and_then(|m| m.side.position_side());
        let position = tracked_side
            .and_then(|side| pair.get(side))
            .or_else(|| pair.primary())
            .cloned();

        if let Some(ref held) = position {
            if !levels.contains_key(&SignalLevel::L2) {
                debug!(symbol = %signal.symbol, "Synthesizing L2 metadata from exchange position");
                levels.insert(
                    SignalLevel::L2,
                    LocalPositionMeta::from_position(held, SignalLevel::L2),
                );
            }
        }

        Ok((position, levels.get(&signal.level).cloned()))
    }

    pub async fn apply_action(
        &self,
        action: Action,
        signal: &Signal,
        position: Option<&PositionInfo>,
    ) -> Result<Option<String>> {
        self.apply_decision(&Decision::new(action, action.as_str()), signal, position)
            .await
    }

    /// Execute `decision`; returns the order id when an order was placed
    pub async fn apply_decision(
        &self,
        decision: &Decision,
        signal: &Signal,
        position: Option<&PositionInfo>,
    ) -> Result<Option<String>> {
        let action = decision.action;
        if let Some(entry) = EntryParams::for_action(action) {
            let id = self
                .open(signal, entry.tp_pct, entry.sl_pct, entry.size_pct)
                .await?;
            return Ok(Some(id));
        }

        match action {
            Action::Ignore => Ok(None),
            Action::Reduce => {
                let Some(held) = position else {
                    info!(symbol = %signal.symbol, "Reduce skipped: no position");
                    return Ok(None);
                };
                let percent = decision.reduce_percent.unwrap_or(DEFAULT_REDUCE_PERCENT);
                let Some(amount) = reduce_amount(held.amount, percent) else {
                    info!(symbol = %signal.symbol, amount = %held.amount, "Reduce skipped: position too small");
                    return Ok(None);
                };
                let id = self
                    .close_amount(held, amount, signal.trade_type, Some(signal))
                    .await?;
                self.scale_metas(&signal.symbol, percent);
                Ok(Some(id))
            }
            Action::TightenSL => {
                let Some(held) = position else {
                    info!(symbol = %signal.symbol, "TightenSL skipped: no position");
                    return Ok(None);
                };
                match trailing_stop(held, LOCK_PROFIT_RATIO) {
                    Some(stop) => {
                        self.exchange
                            .amend_stop_loss(&held.symbol, signal.trade_type, held.direction, stop)
                            .await?;
                        info!(symbol = %held.symbol, %stop, "Stop-loss tightened");
                    }
                    None => {
                        debug!(symbol = %held.symbol, "TightenSL skipped: no floating profit");
                    }
                }
                Ok(None)
            }
            Action::Close => {
                let Some(held) = position else {
                    info!(symbol = %signal.symbol, "Close skipped: no position");
                    return Ok(None);
                };
                let id = self
                    .close_amount(held, held.amount, signal.trade_type, Some(signal))
                    .await?;
                self.clear_meta(&signal.symbol);
                Ok(Some(id))
            }
            Action::Open | Action::OpenSmall | Action::Add | Action::AddSmall => Ok(None),
        }
    }

    fn scale_metas(&self, symbol: &str, shed: f64) {
        let Some(keep) = Decimal::from_f64(1.0 - shed) else {
            return;
        };
        if let Some(levels) = self.metas.lock().get_mut(symbol) {
            for meta in levels.values_mut() {
                meta.size = (meta.size * keep).round_dp(2);
            }
        }
    }

    pub fn get_position_by_level(&self, symbol: &str, level: SignalLevel) -> Option<LocalPositionMeta> {
        self.metas.lock().get(symbol)?.get(&level).cloned()
    }

    pub fn clear_meta(&self, symbol: &str) {
        if self.metas.lock().remove(symbol).is_some() {
            debug!(symbol, "Local position metadata cleared");
        }
    }

    /// Side of the locally tracked L2 position
    pub fn l2_side(&self, symbol: &str) -> Option<Side> {
        self.get_position_by_level(symbol, SignalLevel::L2)
            .map(|m| m.side)
    }

    async fn persist(&self, record: OrderRecord) {
        if let Err(e) = self.store.save(&record).await {
            warn!(
                order_id = %record.order_id,
                symbol = %record.symbol,
                "Failed to persist order record: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::InMemoryOrderStore;
    use crate::testing::{sample_position, MockExchange};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use types::PositionSide;

    fn service() -> (Arc<MockExchange>, Arc<InMemoryOrderStore>, PositionService) {
        let mock = Arc::new(MockExchange::new());
        mock.set_price("BTC/USDT", dec!(100000));
        mock.set_balance(dec!(10000));
        let store = Arc::new(InMemoryOrderStore::new());
        let service = PositionService::new(mock.clone(), store.clone());
        (mock, store, service)
    }

    fn signal(side: Side, level: SignalLevel) -> Signal {
        Signal::new(
            "tv-level",
            "BTC/USDT",
            side,
            level,
            dec!(100000),
            Utc.with_ymd_and_hms(2025, 8, 10, 12, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_open_sizes_sets_leverage_and_records() {
        let (mock, store, service) = service();
        let id = service
            .open(&signal(Side::Buy, SignalLevel::L2), 0.8, 0.9, 0.0)
            .await
            .unwrap();

        let orders = mock.orders();
        assert_eq!(orders.len(), 1);
        let order = &orders[0];
        // level default 20%: 10000 * 0.2 * 0.98 * 20 / 100000 = 0.392
        assert_eq!(order.size, dec!(0.39));
        assert_eq!(order.price, Decimal::ZERO);
        assert_eq!(order.take_profit, Some(dec!(100800)));
        assert_eq!(order.stop_loss, Some(dec!(99100)));
        assert_eq!(order.position_side, PositionSide::Long);
        assert_eq!(order.leverage, 20);
        assert_eq!(mock.leverage_calls().len(), 1);

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].order_id, id);
        assert_eq!(records[0].level, 2);

        let meta = service.get_position_by_level("BTC/USDT", SignalLevel::L2).unwrap();
        assert_eq!(meta.side, Side::Buy);
        assert_eq!(meta.entry_price, dec!(100000));
    }

    #[tokio::test]
    async fn test_configured_margin_mode_reaches_exchange() {
        let (mock, store, _) = service();
        let service = PositionService::new(mock.clone(), store.clone())
            .with_margin_mode(MarginMode::Isolated);
        service
            .open(&signal(Side::Sell, SignalLevel::L2), 0.8, 0.9, 0.0)
            .await
            .unwrap();

        assert_eq!(mock.orders()[0].margin_mode, MarginMode::Isolated);
        let calls = mock.leverage_calls();
        assert_eq!(calls[0].2, MarginMode::Isolated);
        assert_eq!(store.records()[0].mgn_mode, MarginMode::Isolated);
    }

    #[tokio::test]
    async fn test_rejected_order_leaves_no_meta() {
        let (mock, store, service) = service();
        mock.set_reject_orders(true);
        let result = service
            .apply_action(Action::Open, &signal(Side::Buy, SignalLevel::L2), None)
            .await;
        assert!(result.is_err());
        assert!(service.get_position_by_level("BTC/USDT", SignalLevel::L2).is_none());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_ignore_is_noop() {
        let (mock, store, service) = service();
        service
            .open(&signal(Side::Buy, SignalLevel::L2), 0.8, 0.9, 0.0)
            .await
            .unwrap();
        let before = service.get_position_by_level("BTC/USDT", SignalLevel::L2);
        let positions = mock.position_pair("BTC/USDT");

        let result = service
            .apply_action(Action::Ignore, &signal(Side::Sell, SignalLevel::L2), None)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(service.get_position_by_level("BTC/USDT", SignalLevel::L2), before);
        assert_eq!(mock.position_pair("BTC/USDT"), positions);
        assert_eq!(mock.orders().len(), 1);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_state_clears_meta_when_exchange_flat() {
        let (mock, _, service) = service();
        service
            .open(&signal(Side::Buy, SignalLevel::L3), 1.0, 1.0, 0.05)
            .await
            .unwrap();
        assert!(service.get_position_by_level("BTC/USDT", SignalLevel::L3).is_some());

        mock.clear_positions("BTC/USDT");
        let (position, meta) = service.state(&signal(Side::Buy, SignalLevel::L3)).await.unwrap();
        assert!(position.is_none() && meta.is_none());
        assert!(service.get_position_by_level("BTC/USDT", SignalLevel::L3).is_none());
    }

    #[tokio::test]
    async fn test_state_synthesizes_l2_meta() {
        let (mock, _, service) = service();
        mock.set_position(sample_position(
            "BTC/USDT",
            PositionSide::Short,
            dec!(2),
            dec!(101000),
            dec!(100000),
        ));

        let (position, meta) = service.state(&signal(Side::Sell, SignalLevel::L2)).await.unwrap();
        assert_eq!(position.unwrap().direction, PositionSide::Short);
        let meta = meta.unwrap();
        assert_eq!(meta.side, Side::Sell);
        assert_eq!(meta.entry_price, dec!(101000));
        assert_eq!(service.l2_side("BTC/USDT"), Some(Side::Sell));
    }

    #[tokio::test]
    async fn test_close_clears_meta() {
        let (mock, _, service) = service();
        let open = signal(Side::Buy, SignalLevel::L2);
        service.apply_action(Action::Open, &open, None).await.unwrap();

        let (position, _) = service.state(&open).await.unwrap();
        let close = signal(Side::Sell, SignalLevel::L2);
        service
            .apply_action(Action::Close, &close, position.as_ref())
            .await
            .unwrap();

        assert!(service.get_position_by_level("BTC/USDT", SignalLevel::L2).is_none());
        assert!(mock.position_pair("BTC/USDT").is_flat());
        assert_eq!(mock.closes().len(), 1);
    }

    #[tokio::test]
    async fn test_reduce_closes_partial_amount() {
        let (mock, _, service) = service();
        let position = sample_position("BTC/USDT", PositionSide::Long, dec!(3), dec!(100000), dec!(102000));
        mock.set_position(position.clone());

        let decision = Decision::reduce(0.3, "L3-counter-reduce");
        service
            .apply_decision(&decision, &signal(Side::Sell, SignalLevel::L3), Some(&position))
            .await
            .unwrap();
        assert_eq!(mock.closes()[0].amount, dec!(0.9));
        assert_eq!(mock.position_pair("BTC/USDT").long.unwrap().amount, dec!(2.1));

        // Plain Reduce halves
        let position = mock.position_pair("BTC/USDT").long.unwrap();
        service
            .apply_action(Action::Reduce, &signal(Side::Sell, SignalLevel::L3), Some(&position))
            .await
            .unwrap();
        assert_eq!(mock.closes()[1].amount, dec!(1.05));
    }

    #[tokio::test]
    async fn test_tighten_sl_amends_without_order() {
        let (mock, _, service) = service();
        let position = sample_position("BTC/USDT", PositionSide::Long, dec!(1), dec!(100000), dec!(101000));
        service
            .apply_action(Action::TightenSL, &signal(Side::Buy, SignalLevel::L3), Some(&position))
            .await
            .unwrap();
        assert!(mock.orders().is_empty());
        assert_eq!(mock.sl_amends(), vec![("BTC/USDT".to_string(), PositionSide::Long, dec!(100300))]);

        let losing = sample_position("BTC/USDT", PositionSide::Long, dec!(1), dec!(100000), dec!(99000));
        service
            .apply_action(Action::TightenSL, &signal(Side::Buy, SignalLevel::L3), Some(&losing))
            .await
            .unwrap();
        assert_eq!(mock.sl_amends().len(), 1);
    }

    #[tokio::test]
    async fn test_close_all_closes_both_sides() {
        let (mock, _, service) = service();
        mock.set_position(sample_position("BTC/USDT", PositionSide::Long, dec!(1), dec!(100000), dec!(100000)));
        mock.set_position(sample_position("BTC/USDT", PositionSide::Short, dec!(2), dec!(100000), dec!(100000)));
        let ids = service.close_all("BTC/USDT", TradeType::Swap).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(mock.position_pair("BTC/USDT").is_flat());
    }
}
