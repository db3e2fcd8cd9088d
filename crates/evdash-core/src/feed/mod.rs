//! Telemetry Feed
//!
//! The publish/subscribe side of the dashboard. A [`FeedClient`] owns one
//! broker connection and turns it into a stream of [`FeedEvent`]s; the live
//! engine consumes those events and never talks to the transport directly.
//!
//! Implementations:
//! - [`MqttFeed`] - MQTT broker over TCP, TLS or WebSockets
//! - [`ChannelFeed`] - in-process feed driven through a [`FeedSender`]
//! - [`DemoFeed`] - simulated vehicle for running without a broker

mod backoff;
mod channel;
pub mod demo;
mod error;
mod mqtt;

pub use backoff::Backoff;
pub use channel::{ChannelFeed, FeedSender};
pub use demo::DemoFeed;
pub use error::FeedError;
pub use mqtt::MqttFeed;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default subscription topic
pub const DEFAULT_TOPIC: &str = "can/data";

/// Default MQTT keepalive in seconds
pub const DEFAULT_KEEPALIVE_SECS: u64 = 60;

/// Default delay before the first reconnect attempt in milliseconds
pub const DEFAULT_RECONNECT_PERIOD_MS: u64 = 1000;

/// Upper bound for the reconnect delay in milliseconds
pub const DEFAULT_MAX_RECONNECT_PERIOD_MS: u64 = 30_000;

/// Lifecycle and data events delivered by a feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The transport connected (and the subscription was requested)
    Connected,
    /// A message arrived on a subscribed topic
    Message { topic: String, payload: Vec<u8> },
    /// The transport closed
    Closed,
    /// The transport failed; the client keeps retrying on its own
    Error(String),
}

/// A connection to a telemetry broker.
///
/// `next_event` must be cancel-safe: the engine polls it inside `select!`
/// together with its timers.
#[async_trait]
pub trait FeedClient: Send + 'static {
    /// Open the connection. Calling this on an open client is a no-op.
    async fn connect(&mut self) -> Result<(), FeedError>;

    /// Wait for the next event. `None` means the feed has ended for good.
    async fn next_event(&mut self) -> Option<FeedEvent>;

    /// Close the connection and release its resources
    async fn disconnect(&mut self);

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Broker connection settings for one vehicle model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Broker URL (`mqtt://`, `mqtts://`, `ws://` or `wss://`)
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Client identifier; generated when absent
    pub client_id: Option<String>,
    /// Topic carrying the telemetry JSON
    pub topic: String,
    pub keepalive_secs: u64,
    pub reconnect_period_ms: u64,
    pub max_reconnect_period_ms: u64,
    pub clean_session: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: None,
            password: None,
            client_id: None,
            topic: DEFAULT_TOPIC.to_string(),
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
            reconnect_period_ms: DEFAULT_RECONNECT_PERIOD_MS,
            max_reconnect_period_ms: DEFAULT_MAX_RECONNECT_PERIOD_MS,
            clean_session: true,
        }
    }
}

impl FeedConfig {
    /// Create a configuration for a broker URL with defaults for the rest
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    /// Reconnect policy described by this configuration
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.reconnect_period_ms),
            Duration::from_millis(self.max_reconnect_period_ms),
        )
    }

    /// Configured client id, or a fresh `evdash-xxxxxxxxxxxx`
    pub fn client_id(&self) -> String {
        match self.client_id.as_deref() {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                format!("evdash-{}", &id[..12])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_config_defaults() {
        let config: FeedConfig = serde_json::from_str(r#"{"url": "mqtt://broker:1883"}"#).unwrap();
        assert_eq!(config.topic, "can/data");
        assert_eq!(config.keepalive(), Duration::from_secs(60));
        assert_eq!(config.reconnect_period_ms, 1000);
        assert!(config.clean_session);
    }

    #[test]
    fn test_generated_client_id() {
        let config = FeedConfig::new("mqtt://broker");
        let id = config.client_id();
        assert!(id.starts_with("evdash-"));
        assert_eq!(id.len(), 19);
        assert_ne!(id, config.client_id());

        let fixed = FeedConfig {
            client_id: Some("dash-01".into()),
            ..FeedConfig::default()
        };
        assert_eq!(fixed.client_id(), "dash-01");
    }
}
