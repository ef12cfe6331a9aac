//! Signed REST transport for the OKX v5 API

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use super::models::RawResponse;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::rate_limit::{EndpointClass, RateLimiter};
use crate::retry::RetryPolicy;
use crate::{AdapterError, Result, Venue};

type HmacSha256 = Hmac<Sha256>;

/// API key triple
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct OkxClientConfig {
    pub base_url: String,
    pub credentials: Option<Credentials>,
    /// Adds `x-simulated-trading: 1` to every request
    pub simulated: bool,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
}

impl Default for OkxClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.okx.com".to_string(),
            credentials: None,
            simulated: false,
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// `base64(HMAC-SHA256(secret, timestamp + method + requestPath + body))`
pub fn sign(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AdapterError::Configuration(format!("Invalid OKX secret key: {e}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(request_path.as_bytes());
    mac.update(body.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Shared, stateless aside from credentials and resilience bookkeeping
pub struct OkxClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    simulated: bool,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl OkxClient {
    pub fn new(config: OkxClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: config.credentials,
            simulated: config.simulated,
            limiter: RateLimiter::default(),
            breaker: CircuitBreaker::new(Venue::Okx, config.breaker),
            retry: config.retry,
        })
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// GET returning the decoded `data` array
    pub async fn get<T: DeserializeOwned>(
        &self,
        class: EndpointClass,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<Vec<T>> {
        let request_path = if params.is_empty() {
            path.to_string()
        } else {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
                .finish();
            format!("{path}?{query}")
        };
        self.execute(class, Method::GET, request_path, None, signed)
            .await
    }

    /// Signed POST returning the decoded `data` array. Trade-class writes are
    /// never retried: a timed-out submit may already have landed.
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        class: EndpointClass,
        path: &str,
        body: &B,
    ) -> Result<Vec<T>> {
        let body = serde_json::to_string(body)?;
        self.execute(class, Method::POST, path.to_string(), Some(body), true)
            .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        class: EndpointClass,
        method: Method,
        request_path: String,
        body: Option<String>,
        signed: bool,
    ) -> Result<Vec<T>> {
        let what = format!("{} {}", method, request_path);
        let policy = if class == EndpointClass::Trade && method == Method::POST {
            RetryPolicy::none()
        } else {
            self.retry.clone()
        };

        let data = policy
            .run(&what, || {
                self.breaker.call(|| {
                    self.send_once(class, method.clone(), &request_path, body.as_deref(), signed)
                })
            })
            .await?;

        Ok(serde_json::from_value(data)?)
    }

    async fn send_once(
        &self,
        class: EndpointClass,
        method: Method,
        request_path: &str,
        body: Option<&str>,
        signed: bool,
    ) -> Result<serde_json::Value> {
        self.limiter.wait(class).await;

        let url = format!("{}{}", self.base_url, request_path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");

        if self.simulated {
            request = request.header("x-simulated-trading", "1");
        }

        if signed {
            let creds = self.credentials.as_ref().ok_or_else(|| {
                AdapterError::Configuration("OKX credentials are not configured".to_string())
            })?;
            let timestamp = iso_timestamp();
            let signature = sign(
                &creds.secret_key,
                &timestamp,
                method.as_str(),
                request_path,
                body.unwrap_or_default(),
            )?;
            request = request
                .header("OK-ACCESS-KEY", creds.api_key.as_str())
                .header("OK-ACCESS-SIGN", signature)
                .header("OK-ACCESS-TIMESTAMP", timestamp)
                .header("OK-ACCESS-PASSPHRASE", creds.passphrase.as_str());
        }

        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        debug!("OKX {} {}", method, request_path);
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.as_u16() == 429 {
            return Err(AdapterError::RateLimitExceeded { venue: Venue::Okx });
        }

        let envelope: RawResponse = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(AdapterError::HttpStatus {
                    venue: Venue::Okx,
                    status: status.as_u16(),
                    body: text,
                })
            }
            Err(e) => return Err(e.into()),
        };

        if envelope.code == "0" {
            return Ok(envelope.data);
        }

        let (code, message) = envelope
            .item_status()
            .filter(|(code, _)| !code.is_empty() && code != "0")
            .unwrap_or((envelope.code.clone(), envelope.msg.clone()));
        Err(classify(code, message))
    }
}

/// Map an OKX business code onto the adapter error taxonomy
fn classify(code: String, message: String) -> AdapterError {
    match code.as_str() {
        "50011" | "50061" => AdapterError::RateLimitExceeded { venue: Venue::Okx },
        c if c.starts_with("501") && c.len() == 5 => AdapterError::AuthenticationFailed {
            venue: Venue::Okx,
            message,
        },
        "51001" => AdapterError::InvalidInstrument(message),
        c if c.starts_with("51") => AdapterError::OrderRejected {
            venue: Venue::Okx,
            code,
            message,
        },
        _ => AdapterError::Exchange {
            venue: Venue::Okx,
            code,
            message,
        },
    }
}
