//! Channel-based feed.
//!
//! Lets the host application (or a test) push feed events from its own code,
//! for example when telemetry arrives through a transport the core does not
//! know about.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{FeedClient, FeedError, FeedEvent};

/// Sending half of a [`ChannelFeed`]
#[derive(Debug, Clone)]
pub struct FeedSender {
    tx: mpsc::UnboundedSender<FeedEvent>,
}

impl FeedSender {
    /// Send a raw event. Returns false once the feed has been dropped.
    pub fn send(&self, event: FeedEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn connected(&self) -> bool {
        self.send(FeedEvent::Connected)
    }

    /// Deliver a message payload on a topic
    pub fn message(&self, topic: &str, payload: impl Into<Vec<u8>>) -> bool {
        self.send(FeedEvent::Message {
            topic: topic.to_string(),
            payload: payload.into(),
        })
    }

    /// Deliver a JSON value as a message payload
    pub fn json(&self, topic: &str, value: &serde_json::Value) -> bool {
        self.message(topic, value.to_string())
    }

    pub fn closed(&self) -> bool {
        self.send(FeedEvent::Closed)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(FeedEvent::Error(message.into()))
    }
}

/// A feed whose events come from a [`FeedSender`]
#[derive(Debug)]
pub struct ChannelFeed {
    rx: mpsc::UnboundedReceiver<FeedEvent>,
    description: String,
}

impl ChannelFeed {
    /// Create a connected sender/feed pair
    pub fn new(description: &str) -> (FeedSender, ChannelFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            FeedSender { tx },
            ChannelFeed {
                rx,
                description: format!("channel: {}", description),
            },
        )
    }
}

#[async_trait]
impl FeedClient for ChannelFeed {
    async fn connect(&mut self) -> Result<(), FeedError> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<FeedEvent> {
        self.rx.recv().await
    }

    async fn disconnect(&mut self) {
        self.rx.close();
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
