//! OKX v5 wire formats

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use types::{Kline, MarginMode, PositionInfo, PositionSide};

use crate::{AdapterError, Result};

/// Common envelope; `data` is decoded by the caller
#[derive(Debug, Deserialize)]
pub(crate) struct RawResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

impl RawResponse {
    /// Per-item status carried by order-style endpoints on failure
    pub fn item_status(&self) -> Option<(String, String)> {
        let first = self.data.as_array()?.first()?;
        let code = first.get("sCode")?.as_str()?.to_string();
        let msg = first
            .get("sMsg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some((code, msg))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Ticker {
    pub last: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Position {
    pub pos_side: String,
    pub pos: String,
    pub avg_px: String,
    pub mark_px: String,
    pub margin: String,
    pub imr: String,
    pub lever: String,
    pub mgn_mode: String,
    pub upl: String,
    pub upl_ratio: String,
    pub liq_px: String,
    pub c_time: String,
}

impl Position {
    /// `None` for an empty row
    pub fn into_position_info(self, symbol: &str) -> Result<Option<PositionInfo>> {
        let pos = parse_decimal("pos", &self.pos)?;
        if pos.is_zero() {
            return Ok(None);
        }

        let direction = match self.pos_side.as_str() {
            "long" => PositionSide::Long,
            "short" => PositionSide::Short,
            // net mode: sign carries the direction
            _ if pos.is_sign_negative() => PositionSide::Short,
            _ => PositionSide::Long,
        };

        let margin = if self.margin.is_empty() {
            parse_optional_decimal("imr", &self.imr)?.unwrap_or_default()
        } else {
            parse_decimal("margin", &self.margin)?
        };

        Ok(Some(PositionInfo {
            symbol: symbol.to_string(),
            direction,
            amount: pos.abs(),
            avg_price: parse_decimal("avgPx", &self.avg_px)?,
            mark_price: parse_optional_decimal("markPx", &self.mark_px)?.unwrap_or_default(),
            margin,
            leverage: parse_f64("lever", &self.lever).map(|l| l.round() as u32).unwrap_or(0),
            margin_mode: MarginMode::from_str(&self.mgn_mode).unwrap_or_default(),
            unrealized_pnl: parse_optional_decimal("upl", &self.upl)?.unwrap_or_default(),
            unrealized_return_ratio: parse_f64("uplRatio", &self.upl_ratio).unwrap_or(0.0),
            liquidation_price: parse_optional_decimal("liqPx", &self.liq_px)?,
            open_time: parse_millis("cTime", &self.c_time).unwrap_or_else(|_| Utc::now()),
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct OrderAck {
    pub ord_id: String,
    pub s_code: String,
    pub s_msg: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Balance {
    pub details: Vec<BalanceDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct BalanceDetail {
    pub ccy: String,
    pub avail_bal: String,
    pub avail_eq: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Instrument {
    pub ct_val: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct AlgoOrder {
    pub algo_id: String,
    pub pos_side: String,
    pub sl_trigger_px: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct AmendAck {
    pub s_code: String,
    pub s_msg: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlaceOrderBody {
    pub inst_id: String,
    pub td_mode: String,
    pub side: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_side: Option<String>,
    pub ord_type: String,
    pub sz: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
    pub cl_ord_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attach_algo_ords: Vec<AttachAlgoOrd>,
}

/// TP/SL attached to the order; `-1` order price means market on trigger
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttachAlgoOrd {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_trigger_px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_ord_px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl_trigger_px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl_ord_px: Option<String>,
}

impl AttachAlgoOrd {
    pub fn new(tp: Option<Decimal>, sl: Option<Decimal>) -> Option<Self> {
        if tp.is_none() && sl.is_none() {
            return None;
        }
        Some(Self {
            tp_trigger_px: tp.map(|p| p.to_string()),
            tp_ord_px: tp.map(|_| "-1".to_string()),
            sl_trigger_px: sl.map(|p| p.to_string()),
            sl_ord_px: sl.map(|_| "-1".to_string()),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetLeverageBody {
    pub inst_id: String,
    pub lever: String,
    pub mgn_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_side: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AmendAlgoBody {
    pub inst_id: String,
    pub algo_id: String,
    pub new_sl_trigger_px: String,
    pub new_sl_ord_px: String,
}

/// `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]`; `None` while the
/// candle is still forming
pub(crate) fn parse_candle(row: &[String]) -> Result<Option<Kline>> {
    if row.len() < 6 {
        return Err(AdapterError::MissingField {
            field: format!("candle column {}", row.len()),
        });
    }
    if row.get(8).map(|c| c == "0").unwrap_or(false) {
        return Ok(None);
    }

    let quote_volume = match row.get(7) {
        Some(v) if !v.is_empty() => parse_f64("volCcyQuote", v)?,
        _ => 0.0,
    };

    Ok(Some(Kline {
        timestamp: parse_millis("ts", &row[0])?,
        open: parse_f64("o", &row[1])?,
        high: parse_f64("h", &row[2])?,
        low: parse_f64("l", &row[3])?,
        close: parse_f64("c", &row[4])?,
        volume: parse_f64("vol", &row[5])?,
        quote_volume,
    }))
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|_| AdapterError::InvalidNumeric {
            field: field.to_string(),
            value: value.to_string(),
        })
}

pub(crate) fn parse_optional_decimal(field: &str, value: &str) -> Result<Option<Decimal>> {
    if value.is_empty() {
        Ok(None)
    } else {
        parse_decimal(field, value).map(Some)
    }
}

pub(crate) fn parse_f64(field: &str, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| AdapterError::InvalidNumeric {
        field: field.to_string(),
        value: value.to_string(),
    })
}

pub(crate) fn parse_millis(field: &str, value: &str) -> Result<DateTime<Utc>> {
    let ms = value.parse::<i64>().map_err(|_| AdapterError::InvalidNumeric {
        field: field.to_string(),
        value: value.to_string(),
    })?;
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AdapterError::InvalidNumeric {
            field: field.to_string(),
            value: value.to_string(),
        })
}

pub(crate) fn decimal_from_f64(field: &str, value: f64) -> Result<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| AdapterError::InvalidNumeric {
        field: field.to_string(),
        value: value.to_string(),
    })
}
