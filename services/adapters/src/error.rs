//! Error types for venue adapters

use crate::Venue;
use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Main error type for adapter operations
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Connection-related errors
    #[error("Connection failed for venue {venue}: {reason}")]
    ConnectionFailed {
        /// The venue that failed to connect
        venue: Venue,
        /// Reason for the failure
        reason: String,
    },

    /// Request or read exceeded its deadline
    #[error("Timeout for venue {venue} after {timeout_ms}ms")]
    ConnectionTimeout { venue: Venue, timeout_ms: u64 },

    /// Credentials rejected by the venue
    #[error("Authentication failed for venue {venue}: {message}")]
    AuthenticationFailed { venue: Venue, message: String },

    /// Rate limit exceeded on the venue API
    #[error("Rate limit exceeded for venue {venue}")]
    RateLimitExceeded { venue: Venue },

    /// Transport error from the HTTP client
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP status outside 2xx
    #[error("HTTP status {status} from {venue}: {body}")]
    HttpStatus {
        venue: Venue,
        status: u16,
        body: String,
    },

    /// Venue answered with a non-zero business code
    #[error("{venue} error {code}: {message}")]
    Exchange {
        venue: Venue,
        code: String,
        message: String,
    },

    /// Order refused (insufficient margin, bad size, closed market...)
    #[error("Order rejected by {venue} ({code}): {message}")]
    OrderRejected {
        venue: Venue,
        code: String,
        message: String,
    },

    /// Unknown or unsupported instrument
    #[error("Invalid instrument: {0}")]
    InvalidInstrument(String),

    /// JSON parsing error from venue response
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Required field missing from venue message
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Invalid numeric value in venue data
    #[error("Invalid numeric value for {field}: {value}")]
    InvalidNumeric { field: String, value: String },

    /// Domain value conversion failure
    #[error(transparent)]
    Type(#[from] types::TypeError),

    /// No attached stop-loss to amend
    #[error("No stop-loss order found for {symbol}")]
    StopLossNotFound { symbol: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection closed error
    #[error("Connection closed for venue {venue}: {reason:?}")]
    ConnectionClosed {
        venue: Venue,
        reason: Option<String>,
    },

    /// Configuration error in adapter settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Circuit breaker triggered due to repeated failures
    #[error("Circuit breaker open for venue {venue}")]
    CircuitBreakerOpen { venue: Venue },

    /// Not supported operation
    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl AdapterError {
    /// Check if this error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            AdapterError::ConnectionFailed { .. }
            | AdapterError::ConnectionTimeout { .. }
            | AdapterError::RateLimitExceeded { .. }
            | AdapterError::WebSocket(_)
            | AdapterError::ConnectionClosed { .. } => true,
            AdapterError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            AdapterError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            // 50001 service unavailable, 50004 endpoint timeout, 50011 rate limit,
            // 50013 system busy
            AdapterError::Exchange { code, .. } => {
                matches!(code.as_str(), "50001" | "50004" | "50011" | "50013")
            }
            _ => false,
        }
    }

    /// Check if this error indicates a permanent failure
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AdapterError::AuthenticationFailed { .. }
                | AdapterError::Configuration(_)
                | AdapterError::InvalidInstrument(_)
                | AdapterError::OrderRejected { .. }
                | AdapterError::NotSupported(_)
                | AdapterError::Type(_)
        )
    }

    /// Whether this failure should count against the circuit breaker
    pub fn trips_breaker(&self) -> bool {
        self.is_recoverable() && !matches!(self, AdapterError::RateLimitExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let busy = AdapterError::Exchange {
            venue: Venue::Okx,
            code: "50013".into(),
            message: "Systems are busy".into(),
        };
        assert!(busy.is_recoverable());
        assert!(!busy.is_permanent());

        let margin = AdapterError::OrderRejected {
            venue: Venue::Okx,
            code: "51008".into(),
            message: "Insufficient margin".into(),
        };
        assert!(!margin.is_recoverable());
        assert!(margin.is_permanent());

        let limited = AdapterError::RateLimitExceeded { venue: Venue::Okx };
        assert!(limited.is_recoverable());
        assert!(!limited.trips_breaker());

        let status = AdapterError::HttpStatus {
            venue: Venue::Okx,
            status: 502,
            body: String::new(),
        };
        assert!(status.is_recoverable());
    }
}
