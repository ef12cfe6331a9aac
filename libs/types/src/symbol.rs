//! Symbol normalization
//!
//! The pipeline keys everything by `BASE/QUOTE`. Producers may also send
//! `BASE-QUOTE` or exchange instrument ids such as `BASE-QUOTE-SWAP`.

use crate::error::{Result, TypeError};
use crate::trading::TradeType;

/// Canonical `BASE/QUOTE` form of any accepted spelling
pub fn normalize(symbol: &str) -> Result<String> {
    let (base, quote) = split(symbol)?;
    Ok(format!("{base}/{quote}"))
}

/// Upper-cased base and quote assets
pub fn split(symbol: &str) -> Result<(String, String)> {
    let upper = symbol.trim().to_ascii_uppercase();
    let mut parts = upper.split(['/', '-']).filter(|p| !p.is_empty());
    let base = parts.next();
    let quote = parts.next();
    let suffix = parts.next();

    match (base, quote, suffix) {
        (Some(b), Some(q), None) | (Some(b), Some(q), Some("SWAP")) => {
            Ok((b.to_string(), q.to_string()))
        }
        _ => Err(TypeError::InvalidSymbol(symbol.to_string())),
    }
}

pub fn base_asset(symbol: &str) -> Result<String> {
    split(symbol).map(|(base, _)| base)
}

/// Exchange instrument id for the given trade type
pub fn to_inst_id(symbol: &str, trade_type: TradeType) -> Result<String> {
    let (base, quote) = split(symbol)?;
    match trade_type {
        TradeType::Spot => Ok(format!("{base}-{quote}")),
        TradeType::Swap => Ok(format!("{base}-{quote}-SWAP")),
        TradeType::Futures => Err(TypeError::UnsupportedTradeType {
            symbol: symbol.to_string(),
            trade_type: trade_type.as_str().to_string(),
        }),
    }
}
