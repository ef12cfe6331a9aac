//! Hyperliquid `/info` REST queries

use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use super::models::{ClearinghouseState, WalletPosition};
use crate::retry::RetryPolicy;
use crate::{AdapterError, Result, Venue};

pub struct HyperliquidInfo {
    http: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl HyperliquidInfo {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub async fn clearinghouse_state(&self, address: &str) -> Result<ClearinghouseState> {
        let body = json!({"type": "clearinghouseState", "user": address});
        self.retry
            .run("clearinghouseState", || async {
                let response = self.http.post(&self.url).json(&body).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(AdapterError::HttpStatus {
                        venue: Venue::Hyperliquid,
                        status: status.as_u16(),
                        body: response.text().await.unwrap_or_default(),
                    });
                }
                Ok(response.json::<ClearinghouseState>().await?)
            })
            .await
    }

    /// Non-zero positions of `address`, keyed by coin
    pub async fn wallet_positions(&self, address: &str) -> Result<HashMap<String, WalletPosition>> {
        Ok(self.clearinghouse_state(address).await?.positions())
    }
}
