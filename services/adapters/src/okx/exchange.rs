//! OKX v5 implementation of the exchange capability set

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};
use types::{symbol, Kline, MarginMode, OrderRequest, OrderType, PositionSide, TradeType};

use super::client::OkxClient;
use super::models::{
    parse_candle, parse_decimal, AlgoOrder, AmendAck, AmendAlgoBody, AttachAlgoOrd, Balance,
    Instrument, OrderAck, PlaceOrderBody, Position, SetLeverageBody, Ticker,
};
use crate::exchange::{ClosePosition, Exchange, KlineQuery, PositionPair};
use crate::rate_limit::EndpointClass;
use crate::{AdapterError, Result, Venue};

/// The candles endpoint serves at most this many rows per call
const MAX_CANDLES: usize = 300;

pub struct OkxExchange {
    client: OkxClient,
    contract_values: RwLock<HashMap<String, Decimal>>,
    account_timeout: Duration,
}

impl OkxExchange {
    pub fn new(client: OkxClient) -> Self {
        Self {
            client,
            contract_values: RwLock::new(HashMap::new()),
            account_timeout: Duration::from_secs(5),
        }
    }

    /// Deadline applied to position and balance queries
    pub fn with_account_timeout(mut self, timeout: Duration) -> Self {
        self.account_timeout = timeout;
        self
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.account_timeout, fut)
            .await
            .map_err(|_| AdapterError::ConnectionTimeout {
                venue: Venue::Okx,
                timeout_ms: self.account_timeout.as_millis() as u64,
            })?
    }

    fn inst_type(trade_type: TradeType) -> &'static str {
        match trade_type {
            TradeType::Spot => "SPOT",
            TradeType::Swap => "SWAP",
            TradeType::Futures => "FUTURES",
        }
    }

    fn td_mode(trade_type: TradeType, margin_mode: MarginMode) -> &'static str {
        match trade_type {
            TradeType::Spot => "cash",
            _ => margin_mode.as_str(),
        }
    }

    async fn submit(&self, body: PlaceOrderBody) -> Result<String> {
        let acks: Vec<OrderAck> = self
            .client
            .post(EndpointClass::Trade, "/api/v5/trade/order", &body)
            .await?;
        let ack = acks.into_iter().next().ok_or_else(|| AdapterError::MissingField {
            field: "data[0]".to_string(),
        })?;

        if !ack.s_code.is_empty() && ack.s_code != "0" {
            return Err(AdapterError::OrderRejected {
                venue: Venue::Okx,
                code: ack.s_code,
                message: ack.s_msg,
            });
        }

        info!(
            inst_id = %body.inst_id,
            side = %body.side,
            sz = %body.sz,
            ord_id = %ack.ord_id,
            "OKX order accepted"
        );
        Ok(ack.ord_id)
    }

    fn client_order_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

#[async_trait]
impl Exchange for OkxExchange {
    fn name(&self) -> &'static str {
        "okx"
    }

    async fn last_price(&self, symbol: &str) -> Result<Decimal> {
        let inst_id = symbol::to_inst_id(symbol, TradeType::Swap)?;
        let tickers: Vec<Ticker> = self
            .client
            .get(
                EndpointClass::Market,
                "/api/v5/market/ticker",
                &[("instId", inst_id.clone())],
                false,
            )
            .await?;
        let ticker = tickers
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::InvalidInstrument(inst_id))?;
        parse_decimal("last", &ticker.last)
    }

    async fn kline_records(&self, query: &KlineQuery) -> Result<Vec<Kline>> {
        let inst_id = symbol::to_inst_id(&query.symbol, query.trade_type)?;
        let mut params = vec![
            ("instId", inst_id),
            ("bar", query.period.okx_bar().to_string()),
            ("limit", query.limit.min(MAX_CANDLES).to_string()),
        ];
        if let Some(since) = query.since {
            params.push(("before", since.timestamp_millis().to_string()));
        }

        let rows: Vec<Vec<String>> = self
            .client
            .get(EndpointClass::Market, "/api/v5/market/candles", &params, false)
            .await?;

        let mut klines = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(kline) = parse_candle(row)? {
                klines.push(kline);
            }
        }
        // Venue returns newest first
        if query.sorted {
            klines.sort_by_key(|k| k.timestamp);
        }
        debug!(
            "Fetched {} {} candles for {}",
            klines.len(),
            query.period,
            query.symbol
        );
        Ok(klines)
    }

    async fn position(&self, symbol: &str, trade_type: TradeType) -> Result<PositionPair> {
        if trade_type == TradeType::Spot {
            return Err(AdapterError::NotSupported(
                "positions exist only for derivatives".to_string(),
            ));
        }
        let inst_id = symbol::to_inst_id(symbol, trade_type)?;
        let params = [
            ("instType", Self::inst_type(trade_type).to_string()),
            ("instId", inst_id),
        ];

        let rows: Vec<Position> = self
            .with_deadline(self.client.get(
                EndpointClass::Account,
                "/api/v5/account/positions",
                &params,
                true,
            ))
            .await?;

        let mut pair = PositionPair::default();
        for row in rows {
            if let Some(position) = row.into_position_info(symbol)? {
                pair.insert(position);
            }
        }
        Ok(pair)
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        let inst_id = symbol::to_inst_id(&order.symbol, order.trade_type)?;

        let px = match order.order_type {
            OrderType::Market => None,
            OrderType::Limit if order.price.is_zero() => {
                Some(self.last_price(&order.symbol).await?.to_string())
            }
            OrderType::Limit => Some(order.price.to_string()),
        };

        let pos_side = match order.trade_type {
            TradeType::Spot => None,
            _ => Some(order.position_side.as_str().to_string()),
        };

        let body = PlaceOrderBody {
            inst_id,
            td_mode: Self::td_mode(order.trade_type, order.margin_mode).to_string(),
            side: order.side.as_str().to_string(),
            pos_side,
            ord_type: order.order_type.as_str().to_string(),
            sz: order.size.normalize().to_string(),
            px,
            reduce_only: order.reduce_only.then_some(true),
            cl_ord_id: Self::client_order_id(),
            attach_algo_ords: AttachAlgoOrd::new(order.take_profit, order.stop_loss)
                .into_iter()
                .collect(),
        };

        self.submit(body).await
    }

    async fn close_position(&self, request: &ClosePosition) -> Result<String> {
        let inst_id = symbol::to_inst_id(&request.symbol, request.trade_type)?;
        let body = PlaceOrderBody {
            inst_id,
            td_mode: Self::td_mode(request.trade_type, request.margin_mode).to_string(),
            side: request.direction.closing_side().as_str().to_string(),
            pos_side: Some(request.direction.as_str().to_string()),
            ord_type: OrderType::Market.as_str().to_string(),
            sz: request.amount.normalize().to_string(),
            px: None,
            reduce_only: Some(true),
            cl_ord_id: Self::client_order_id(),
            attach_algo_ords: Vec::new(),
        };
        self.submit(body).await
    }

    async fn set_leverage(
        &self,
        symbol: &str,
        leverage: u32,
        margin_mode: MarginMode,
        position_side: PositionSide,
    ) -> Result<()> {
        let inst_id = symbol::to_inst_id(symbol, TradeType::Swap)?;
        let body = SetLeverageBody {
            inst_id,
            lever: leverage.to_string(),
            mgn_mode: margin_mode.as_str().to_string(),
            pos_side: (margin_mode == MarginMode::Isolated)
                .then(|| position_side.as_str().to_string()),
        };
        let _: Vec<serde_json::Value> = self
            .client
            .post(EndpointClass::Trade, "/api/v5/account/set-leverage", &body)
            .await?;
        Ok(())
    }

    async fn available_balance(&self, currency: &str) -> Result<Decimal> {
        let balances: Vec<Balance> = self
            .with_deadline(self.client.get(
                EndpointClass::Account,
                "/api/v5/account/balance",
                &[("ccy", currency.to_string())],
                true,
            ))
            .await?;

        let detail = balances
            .iter()
            .flat_map(|b| b.details.iter())
            .find(|d| d.ccy.eq_ignore_ascii_case(currency));

        match detail {
            Some(d) if !d.avail_bal.is_empty() => parse_decimal("availBal", &d.avail_bal),
            Some(d) if !d.avail_eq.is_empty() => parse_decimal("availEq", &d.avail_eq),
            _ => Ok(Decimal::ZERO),
        }
    }

    async fn contract_multiplier(&self, symbol: &str, trade_type: TradeType) -> Result<Decimal> {
        if trade_type == TradeType::Spot {
            return Ok(Decimal::ONE);
        }
        let inst_id = symbol::to_inst_id(symbol, trade_type)?;
        let cached = self.contract_values.read().get(&inst_id).copied();
        if let Some(value) = cached {
            return Ok(value);
        }

        let instruments: Vec<Instrument> = self
            .client
            .get(
                EndpointClass::Market,
                "/api/v5/public/instruments",
                &[
                    ("instType", Self::inst_type(trade_type).to_string()),
                    ("instId", inst_id.clone()),
                ],
                false,
            )
            .await?;
        let instrument = instruments
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::InvalidInstrument(inst_id.clone()))?;
        let value = parse_decimal("ctVal", &instrument.ct_val)?;

        self.contract_values.write().insert(inst_id, value);
        Ok(value)
    }

    async fn amend_stop_loss(
        &self,
        symbol: &str,
        trade_type: TradeType,
        position_side: PositionSide,
        stop_loss: Decimal,
    ) -> Result<()> {
        let inst_id = symbol::to_inst_id(symbol, trade_type)?;

        let mut target = None;
        for ord_type in ["conditional", "oco"] {
            let pending: Vec<AlgoOrder> = self
                .client
                .get(
                    EndpointClass::Account,
                    "/api/v5/trade/orders-algo-pending",
                    &[
                        ("ordType", ord_type.to_string()),
                        ("instType", Self::inst_type(trade_type).to_string()),
                        ("instId", inst_id.clone()),
                    ],
                    true,
                )
                .await?;
            target = pending.into_iter().find(|algo| {
                !algo.sl_trigger_px.is_empty()
                    && (algo.pos_side == position_side.as_str()
                        || algo.pos_side == "net"
                        || algo.pos_side.is_empty())
            });
            if target.is_some() {
                break;
            }
        }

        let algo = target.ok_or_else(|| AdapterError::StopLossNotFound {
            symbol: symbol.to_string(),
        })?;

        let body = AmendAlgoBody {
            inst_id,
            algo_id: algo.algo_id,
            new_sl_trigger_px: stop_loss.to_string(),
            new_sl_ord_px: "-1".to_string(),
        };
        let acks: Vec<AmendAck> = self
            .client
            .post(EndpointClass::Trade, "/api/v5/trade/amend-algos", &body)
            .await?;
        if let Some(ack) = acks.into_iter().next() {
            if !ack.s_code.is_empty() && ack.s_code != "0" {
                return Err(AdapterError::OrderRejected {
                    venue: Venue::Okx,
                    code: ack.s_code,
                    message: ack.s_msg,
                });
            }
        }

        info!(symbol, %stop_loss, "Stop-loss amended");
        Ok(())
    }
}
