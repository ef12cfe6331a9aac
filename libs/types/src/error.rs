//! Errors raised while parsing or converting domain values

use thiserror::Error;

/// Result type alias for type conversions
pub type Result<T> = std::result::Result<T, TypeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// Symbol could not be split into base and quote
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Signal level outside 1..=3
    #[error("Invalid signal level: {0}")]
    InvalidLevel(u8),

    /// String did not name a known variant
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// Enum being parsed
        kind: &'static str,
        /// Rejected input
        value: String,
    },

    /// Trade type has no instrument mapping
    #[error("Unsupported trade type for {symbol}: {trade_type}")]
    UnsupportedTradeType { symbol: String, trade_type: String },
}

impl TypeError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        TypeError::UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}
