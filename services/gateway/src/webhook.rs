//! HTTP intake for chart webhooks
//!
//! `POST /webhook` takes a JSON [`Signal`] authenticated by a hex
//! HMAC-SHA256 of the raw body in `X-Signature`. Accepted signals are
//! queued for the dispatcher; nothing reaches the queue before the
//! signature has been checked.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::{debug, info, warn};
use types::{symbol, Signal};
use warp::http::StatusCode;
use warp::reject::{self, Rejection};
use warp::reply::Response;
use warp::{Filter, Reply};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

/// Capacity of the webhook → dispatcher queue
pub const QUEUE_CAPACITY: usize = 256;

/// How long a request may wait for queue space before 503
pub const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(2);

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Hex HMAC-SHA256 of `body` under `secret`
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature
pub fn verify_signature(secret: &[u8], body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Clone)]
pub struct WebhookState {
    secret: Arc<Vec<u8>>,
    strategies: Arc<HashSet<String>>,
    queue: mpsc::Sender<Signal>,
    enqueue_timeout: Duration,
}

impl WebhookState {
    /// `strategies` lists the names the dispatcher can route to
    pub fn new(
        secret: impl Into<Vec<u8>>,
        strategies: impl IntoIterator<Item = String>,
        queue: mpsc::Sender<Signal>,
    ) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            strategies: Arc::new(strategies.into_iter().collect()),
            queue,
            enqueue_timeout: ENQUEUE_TIMEOUT,
        }
    }

    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }
}

fn respond(status: StatusCode, body: impl Into<String>) -> Response {
    warp::reply::with_status(body.into(), status).into_response()
}

async fn handle_webhook(
    signature: Option<String>,
    body: Bytes,
    state: WebhookState,
) -> Result<Response, Infallible> {
    let Some(signature) = signature else {
        warn!("Webhook rejected: missing signature");
        return Ok(respond(StatusCode::UNAUTHORIZED, "Missing signature"));
    };
    if !verify_signature(&state.secret, &body, &signature) {
        warn!("Webhook rejected: invalid signature");
        return Ok(respond(StatusCode::UNAUTHORIZED, "Invalid signature"));
    }

    let mut signal: Signal = match serde_json::from_slice(&body) {
        Ok(signal) => signal,
        Err(e) => {
            warn!("Webhook rejected: bad JSON: {}", e);
            return Ok(respond(StatusCode::BAD_REQUEST, format!("Invalid signal: {e}")));
        }
    };
    signal.symbol = match symbol::normalize(&signal.symbol) {
        Ok(normalized) => normalized,
        Err(e) => return Ok(respond(StatusCode::BAD_REQUEST, e.to_string())),
    };
    if !state.strategies.contains(&signal.strategy) {
        warn!(strategy = %signal.strategy, "Webhook rejected: unknown strategy");
        return Ok(respond(
            StatusCode::BAD_REQUEST,
            format!("Unknown strategy {:?}", signal.strategy),
        ));
    }

    info!(
        strategy = %signal.strategy,
        symbol = %signal.symbol,
        side = %signal.side,
        level = %signal.level,
        "Webhook signal accepted"
    );

    match state.queue.send_timeout(signal, state.enqueue_timeout).await {
        Ok(()) => Ok(respond(StatusCode::OK, "Signal received")),
        Err(SendTimeoutError::Timeout(_)) => {
            warn!("Dispatch queue full, rejecting webhook");
            Ok(respond(StatusCode::SERVICE_UNAVAILABLE, "Dispatcher busy"))
        }
        Err(SendTimeoutError::Closed(_)) => {
            Ok(respond(StatusCode::SERVICE_UNAVAILABLE, "Dispatcher stopped"))
        }
    }
}

async fn rejection_reply(err: Rejection) -> Result<Response, Infallible> {
    let reply = if err.find::<reject::PayloadTooLarge>().is_some() {
        respond(StatusCode::PAYLOAD_TOO_LARGE, "Body too large")
    } else if err.find::<reject::LengthRequired>().is_some() {
        respond(StatusCode::LENGTH_REQUIRED, "Content-Length required")
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        respond(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else if err.is_not_found() {
        respond(StatusCode::NOT_FOUND, "Not found")
    } else {
        respond(StatusCode::BAD_REQUEST, "Bad request")
    };
    Ok(reply)
}

/// `POST /webhook` and `GET /health`. Bodies over the size limit are
/// refused from `Content-Length` before they are read.
pub fn routes(
    state: WebhookState,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| respond(StatusCode::OK, "OK"));

    let webhook = warp::path("webhook")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::header::optional::<String>(SIGNATURE_HEADER))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES as u64))
        .and(warp::body::bytes())
        .and(warp::any().map(move || state.clone()))
        .and_then(handle_webhook);

    health
        .or(webhook)
        .unify()
        .recover(rejection_reply)
        .unify()
        .with(warp::log::custom(|info| {
        debug!(
            method = %info.method(),
            path = info.path(),
            status = info.status().as_u16(),
            "HTTP request"
        );
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use types::{Side, SignalLevel};

    const SECRET: &[u8] = b"webhook-secret";

    const BODY: &str = r#"{ "strategy": "tv-level", "symbol": "BTC-USDT", "side": "buy",
        "price": 113990.0, "quantity": 0.01, "order_type": "market",
        "trade_type": "swap", "tp_pct": 0.5, "sl_pct": 0.3,
        "leverage": 20, "score": 4, "level": 1,
        "timestamp": "2025-08-10T21:54:30+08:00", "comment": "breakout" }"#;

    fn state(capacity: usize) -> (WebhookState, mpsc::Receiver<Signal>) {
        let (tx, rx) = mpsc::channel(capacity);
        let state = WebhookState::new(SECRET.to_vec(), ["tv-level".to_string()], tx)
            .with_enqueue_timeout(Duration::from_millis(50));
        (state, rx)
    }

    fn post(body: &str, signature: Option<String>) -> warp::test::RequestBuilder {
        let mut req = warp::test::request()
            .method("POST")
            .path("/webhook")
            .body(body.to_string());
        if let Some(sig) = signature {
            req = req.header("X-Signature", sig);
        }
        req
    }

    #[test]
    fn test_signature_roundtrip() {
        let sig = sign(SECRET, b"payload");
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(SECRET, b"payload", &sig));
        assert!(verify_signature(SECRET, b"payload", &sig.to_uppercase()));
        assert!(!verify_signature(SECRET, b"payload!", &sig));
        assert!(!verify_signature(b"other", b"payload", &sig));
        assert!(!verify_signature(SECRET, b"payload", "not-hex"));
    }

    #[tokio::test]
    async fn test_valid_signal_is_queued() {
        let (state, mut rx) = state(4);
        let res = post(BODY, Some(sign(SECRET, BODY.as_bytes())))
            .reply(&routes(state))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), "Signal received");

        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.strategy, "tv-level");
        assert_eq!(signal.symbol, "BTC/USDT");
        assert_eq!(signal.side, Side::Buy);
        assert_eq!(signal.level, SignalLevel::L1);
        assert_eq!(signal.price, dec!(113990));
        assert_eq!(signal.leverage, 20);
        assert_eq!(signal.score, 4.0);
        assert_eq!(
            signal.timestamp,
            Utc.with_ymd_and_hms(2025, 8, 10, 13, 54, 30).unwrap()
        );
    }

    #[tokio::test]
    async fn test_bad_signature_never_reaches_queue() {
        let (state, mut rx) = state(4);
        let filter = routes(state);

        let res = post(BODY, None).reply(&filter).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let forged = sign(b"wrong-secret", BODY.as_bytes());
        let res = post(BODY, Some(forged)).reply(&filter).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        // Signature over a different body
        let res = post(BODY, Some(sign(SECRET, b"{}"))).reply(&filter).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_post_is_rejected() {
        let (state, _rx) = state(4);
        let res = warp::test::request()
            .method("GET")
            .path("/webhook")
            .reply(&routes(state))
            .await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_bad_json_and_unknown_strategy() {
        let (state, mut rx) = state(4);
        let filter = routes(state);

        let garbage = "{not json";
        let res = post(garbage, Some(sign(SECRET, garbage.as_bytes())))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let body = BODY.replace("tv-level", "nope");
        let res = post(&body, Some(sign(SECRET, body.as_bytes())))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_yields_503() {
        let (state, _rx) = state(1);
        let filter = routes(state);
        let sig = sign(SECRET, BODY.as_bytes());

        let first = post(BODY, Some(sig.clone())).reply(&filter).await;
        assert_eq!(first.status(), StatusCode::OK);
        let second = post(BODY, Some(sig)).reply(&filter).await;
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_oversized_body_is_refused() {
        let (state, mut rx) = state(4);
        let body = format!("{{\"pad\": \"{}\"}}", "x".repeat(MAX_BODY_BYTES));
        let res = post(&body, Some(sign(SECRET, body.as_bytes())))
            .reply(&routes(state))
            .await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _rx) = state(1);
        let res = warp::test::request()
            .path("/health")
            .reply(&routes(state))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), "OK");
    }
}
