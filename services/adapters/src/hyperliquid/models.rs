//! Hyperliquid wire formats

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use crate::Result;

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    channel: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllMids {
    pub mids: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicOrder {
    pub coin: String,
    /// `B` for bids, anything else is a sell
    pub side: String,
    pub limit_px: String,
    pub sz: String,
    pub oid: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub orig_sz: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub order: BasicOrder,
    pub status: String,
    #[serde(default)]
    pub status_timestamp: u64,
}

impl OrderUpdate {
    pub fn is_filled(&self) -> bool {
        self.status == "filled"
    }

    pub fn is_buy(&self) -> bool {
        self.order.side.eq_ignore_ascii_case("B")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    #[serde(default)]
    pub asset_positions: Vec<AssetPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPosition {
    pub position: PerpPosition,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerpPosition {
    pub coin: String,
    /// Signed size; positive is long
    pub szi: String,
    #[serde(default)]
    pub entry_px: Option<String>,
    #[serde(default)]
    pub leverage: Option<Leverage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Leverage {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: u32,
}

/// Tracked wallet's holding in one coin
#[derive(Debug, Clone, PartialEq)]
pub struct WalletPosition {
    pub coin: String,
    pub size: Decimal,
    pub leverage: Option<u32>,
    pub entry_price: Option<Decimal>,
}

impl WalletPosition {
    pub fn is_long(&self) -> bool {
        self.size > Decimal::ZERO
    }
}

impl ClearinghouseState {
    /// Non-zero positions keyed by coin
    pub fn positions(&self) -> HashMap<String, WalletPosition> {
        self.asset_positions
            .iter()
            .filter_map(|asset| {
                let p = &asset.position;
                let size = Decimal::from_str(&p.szi).ok()?;
                if size.is_zero() {
                    return None;
                }
                Some((
                    p.coin.clone(),
                    WalletPosition {
                        coin: p.coin.clone(),
                        size,
                        leverage: p.leverage.as_ref().map(|l| l.value),
                        entry_price: p
                            .entry_px
                            .as_deref()
                            .and_then(|px| Decimal::from_str(px).ok()),
                    },
                ))
            })
            .collect()
    }
}

/// Decoded stream payload
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Mids(HashMap<String, Decimal>),
    OrderUpdates(Vec<OrderUpdate>),
}

/// Decode one text frame. Control channels yield `None`.
pub fn parse_message(text: &str) -> Result<Option<StreamEvent>> {
    let envelope: Envelope = serde_json::from_str(text)?;
    match envelope.channel.as_str() {
        "allMids" => {
            let all: AllMids = serde_json::from_value(envelope.data)?;
            let mids = all
                .mids
                .into_iter()
                .filter_map(|(coin, px)| Decimal::from_str(&px).ok().map(|px| (coin, px)))
                .collect();
            Ok(Some(StreamEvent::Mids(mids)))
        }
        "orderUpdates" => {
            let updates: Vec<OrderUpdate> = serde_json::from_value(envelope.data)?;
            Ok(Some(StreamEvent::OrderUpdates(updates)))
        }
        "subscriptionResponse" | "pong" => Ok(None),
        other => {
            debug!("Ignoring Hyperliquid channel {}", other);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_mids() {
        let text = r#"{"channel":"allMids","data":{"mids":{"HYPE":"32.40","BTC":"113990.5","@1":"bad"}}}"#;
        match parse_message(text).unwrap() {
            Some(StreamEvent::Mids(mids)) => {
                assert_eq!(mids.get("HYPE"), Some(&dec!(32.40)));
                assert_eq!(mids.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_order_updates() {
        let text = r#"{"channel":"orderUpdates","data":[{"order":{"coin":"HYPE","side":"B","limitPx":"32.5","sz":"0.0","oid":42,"timestamp":1754833770000,"origSz":"1.2"},"status":"filled","statusTimestamp":1754833770100}]}"#;
        match parse_message(text).unwrap() {
            Some(StreamEvent::OrderUpdates(updates)) => {
                assert_eq!(updates.len(), 1);
                assert!(updates[0].is_filled());
                assert!(updates[0].is_buy());
                assert_eq!(updates[0].order.orig_sz, "1.2");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_control_channels_are_skipped() {
        assert!(parse_message(r#"{"channel":"pong"}"#).unwrap().is_none());
        assert!(parse_message(r#"{"channel":"subscriptionResponse","data":{}}"#)
            .unwrap()
            .is_none());
        assert!(parse_message("not json").is_err());
    }

    #[test]
    fn test_wallet_positions() {
        let state: ClearinghouseState = serde_json::from_str(
            r#"{"assetPositions":[
                {"position":{"coin":"HYPE","szi":"1.2","entryPx":"31.0","leverage":{"type":"cross","value":10}}},
                {"position":{"coin":"ETH","szi":"-0.5","leverage":{"type":"isolated","value":5,"rawUsd":"-1"}}},
                {"position":{"coin":"SOL","szi":"0.0"}}
            ]}"#,
        )
        .unwrap();
        let positions = state.positions();
        assert_eq!(positions.len(), 2);
        let hype = &positions["HYPE"];
        assert!(hype.is_long());
        assert_eq!(hype.leverage, Some(10));
        assert_eq!(hype.entry_price, Some(dec!(31.0)));
        assert!(!positions["ETH"].is_long());
    }
}
