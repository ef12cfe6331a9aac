//! Long-lived WebSocket reader for a tracked wallet

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, sleep, sleep_until, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::models::{parse_message, StreamEvent};
use crate::retry::Backoff;
use crate::{AdapterError, Result, Venue};

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub ws_url: String,
    /// Wallet whose order updates are followed
    pub address: String,
    /// Client ping cadence
    pub ping_interval: Duration,
    /// Reconnect when nothing arrives for this long
    pub read_timeout: Duration,
    /// Minimum spacing between subscribe frames
    pub subscribe_spacing: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl StreamConfig {
    pub fn new(ws_url: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            address: address.into(),
            ping_interval: Duration::from_secs(50),
            read_timeout: Duration::from_secs(120),
            subscribe_spacing: Duration::from_millis(50),
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

enum SessionEnd {
    Shutdown,
    Disconnected(String),
}

pub struct HyperliquidStream {
    config: StreamConfig,
}

impl HyperliquidStream {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Subscribe frames sent on every (re)connect
    pub fn subscriptions(&self) -> Vec<Value> {
        vec![
            json!({"method": "subscribe", "subscription": {"type": "allMids"}}),
            json!({
                "method": "subscribe",
                "subscription": {"type": "orderUpdates", "user": self.config.address}
            }),
        ]
    }

    /// Read until shutdown, reconnecting with backoff. Mid updates are dropped
    /// when `events` is full; order updates wait for capacity.
    pub async fn run(
        self,
        events: mpsc::Sender<StreamEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        url::Url::parse(&self.config.ws_url)
            .map_err(|e| AdapterError::Configuration(format!("bad ws url: {e}")))?;

        let mut backoff = Backoff::new(self.config.reconnect_base, self.config.reconnect_max);
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            match self.session(&events, &mut shutdown, &mut backoff).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("Hyperliquid stream stopped");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnected(reason)) => {
                    warn!(attempt, "Hyperliquid stream disconnected: {}", reason)
                }
                Err(e) => warn!(attempt, "Hyperliquid stream error: {}", e),
            }

            let delay = backoff.next_delay();
            info!("Reconnecting to Hyperliquid in {}ms", delay.as_millis());
            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.recv() => return Ok(()),
            }
        }
    }

    async fn session(
        &self,
        events: &mpsc::Sender<StreamEvent>,
        shutdown: &mut broadcast::Receiver<()>,
        backoff: &mut Backoff,
    ) -> Result<SessionEnd> {
        let (ws, response) = connect_async(self.config.ws_url.as_str()).await?;
        info!(status = %response.status(), "Hyperliquid stream connected");
        backoff.reset();

        let (mut write, mut read) = ws.split();
        for frame in self.subscriptions() {
            write.send(Message::Text(frame.to_string())).await?;
            sleep(self.config.subscribe_spacing).await;
        }

        let mut ping = interval(self.config.ping_interval);
        ping.tick().await;
        let mut deadline = Instant::now() + self.config.read_timeout;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                _ = ping.tick() => {
                    write.send(Message::Text(r#"{"method":"ping"}"#.to_string())).await?;
                }
                _ = sleep_until(deadline) => {
                    return Err(AdapterError::ConnectionTimeout {
                        venue: Venue::Hyperliquid,
                        timeout_ms: self.config.read_timeout.as_millis() as u64,
                    });
                }
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(SessionEnd::Disconnected("stream ended".to_string())),
                    };
                    deadline = Instant::now() + self.config.read_timeout;

                    match msg {
                        Message::Text(text) => {
                            if !self.forward(&text, events).await {
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                        Message::Ping(payload) => {
                            write.send(Message::Pong(payload)).await?;
                        }
                        Message::Close(frame) => {
                            let reason = frame
                                .map(|f| format!("code={:?} reason={}", f.code, f.reason))
                                .unwrap_or_else(|| "no close frame".to_string());
                            return Ok(SessionEnd::Disconnected(reason));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// False once the consumer has gone away
    async fn forward(&self, text: &str, events: &mpsc::Sender<StreamEvent>) -> bool {
        match parse_message(text) {
            Ok(Some(event @ StreamEvent::Mids(_))) => {
                if let Err(mpsc::error::TrySendError::Closed(_)) = events.try_send(event) {
                    return false;
                }
                true
            }
            Ok(Some(event)) => events.send(event).await.is_ok(),
            Ok(None) => true,
            Err(e) => {
                debug!("Unparseable Hyperliquid frame: {}", e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_frames() {
        let stream = HyperliquidStream::new(StreamConfig::new("wss://example", "0xabc"));
        let subs = stream.subscriptions();
        assert_eq!(subs[0]["subscription"]["type"], "allMids");
        assert_eq!(subs[1]["subscription"]["type"], "orderUpdates");
        assert_eq!(subs[1]["subscription"]["user"], "0xabc");
    }

    #[tokio::test]
    async fn test_mids_dropped_when_channel_full() {
        let stream = HyperliquidStream::new(StreamConfig::new("wss://example", "0xabc"));
        let (tx, mut rx) = mpsc::channel(1);
        let mids = r#"{"channel":"allMids","data":{"mids":{"HYPE":"32.4"}}}"#;

        assert!(stream.forward(mids, &tx).await);
        // Channel full: second mids frame is dropped, not awaited
        assert!(stream.forward(mids, &tx).await);
        assert!(matches!(rx.recv().await, Some(StreamEvent::Mids(_))));
        assert!(rx.try_recv().is_err());

        drop(rx);
        assert!(!stream.forward(mids, &tx).await);
    }

    #[tokio::test]
    async fn test_bad_url_is_rejected() {
        let stream = HyperliquidStream::new(StreamConfig::new("not a url", "0xabc"));
        let (tx, _rx) = mpsc::channel(1);
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        assert!(matches!(
            stream.run(tx, stop_rx).await,
            Err(AdapterError::Configuration(_))
        ));
    }
}
