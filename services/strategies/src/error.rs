//! Error types for the strategy pipeline

use adapter_service::AdapterError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] AdapterError),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backfill failed for {symbol}: {message}")]
    Backfill { symbol: String, message: String },

    #[error("Invalid signal: {message}")]
    InvalidSignal { message: String },

    #[error("Sizing error: {message}")]
    Sizing { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Type(#[from] types::TypeError),

    #[error("Task failed: {message}")]
    Task { message: String },
}

impl StrategyError {
    pub fn invalid_signal(message: impl Into<String>) -> Self {
        StrategyError::InvalidSignal {
            message: message.into(),
        }
    }

    pub fn sizing(message: impl Into<String>) -> Self {
        StrategyError::Sizing {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StrategyError>;
