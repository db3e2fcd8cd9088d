//! MQTT feed client
//!
//! Runs the rumqttc event loop in its own task and forwards events over a
//! channel, so `next_event` is a plain (cancel-safe) channel receive.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Backoff, FeedClient, FeedConfig, FeedError, FeedEvent};

/// Capacity of the rumqttc request channel
const REQUEST_CAPACITY: usize = 10;

/// Events buffered between the event loop task and the engine
const EVENT_BUFFER: usize = 64;

/// MQTT 3.1.1 feed
pub struct MqttFeed {
    config: FeedConfig,
    client: Option<AsyncClient>,
    events: Option<mpsc::Receiver<FeedEvent>>,
    pump: Option<JoinHandle<()>>,
}

impl MqttFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            client: None,
            events: None,
            pump: None,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }
}

/// Build client options from a feed configuration
pub(crate) fn mqtt_options(config: &FeedConfig) -> Result<MqttOptions, FeedError> {
    let url = reqwest::Url::parse(&config.url)
        .map_err(|e| FeedError::InvalidUrl(format!("{}: {}", config.url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| FeedError::InvalidUrl(format!("{}: missing host", config.url)))?
        .to_string();
    let client_id = config.client_id();

    let mut options = match url.scheme() {
        "mqtt" | "tcp" => MqttOptions::new(client_id, host, url.port().unwrap_or(1883)),
        "mqtts" | "ssl" => {
            let mut options = MqttOptions::new(client_id, host, url.port().unwrap_or(8883));
            options.set_transport(Transport::tls_with_default_config());
            options
        }
        // WebSocket transports take the full URL as the broker address
        "ws" => {
            let mut options =
                MqttOptions::new(client_id, config.url.clone(), url.port().unwrap_or(80));
            options.set_transport(Transport::Ws);
            options
        }
        "wss" => {
            let mut options =
                MqttOptions::new(client_id, config.url.clone(), url.port().unwrap_or(443));
            options.set_transport(Transport::wss_with_default_config());
            options
        }
        other => return Err(FeedError::UnsupportedScheme(other.to_string())),
    };

    options.set_keep_alive(config.keepalive().max(Duration::from_secs(5)));
    options.set_clean_session(config.clean_session);
    if let Some(username) = &config.username {
        options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
    }

    Ok(options)
}

#[async_trait]
impl FeedClient for MqttFeed {
    async fn connect(&mut self) -> Result<(), FeedError> {
        if self.client.is_some() {
            return Ok(());
        }

        let options = mqtt_options(&self.config)?;
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        info!(url = %self.config.url, topic = %self.config.topic, "Connecting to MQTT broker");
        let pump = tokio::spawn(pump_events(
            eventloop,
            client.clone(),
            self.config.topic.clone(),
            self.config.backoff(),
            tx,
        ));

        self.client = Some(client);
        self.events = Some(rx);
        self.pump = Some(pump);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<FeedEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    async fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.try_disconnect() {
                debug!("MQTT disconnect request not delivered: {}", e);
            }
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.events = None;
        info!(url = %self.config.url, "MQTT feed closed");
    }

    fn describe(&self) -> String {
        format!("mqtt {} [{}]", self.config.url, self.config.topic)
    }
}

impl Drop for MqttFeed {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Drive the event loop, translating packets into feed events.
///
/// rumqttc reconnects on the next `poll` after an error; the backoff delay
/// keeps that from spinning while the broker is unreachable.
async fn pump_events(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topic: String,
    mut backoff: Backoff,
    tx: mpsc::Sender<FeedEvent>,
) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff.reset();
                if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                    warn!(topic = %topic, "Subscribe request failed: {}", e);
                }
                info!(topic = %topic, "MQTT connected");
                Some(FeedEvent::Connected)
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => Some(FeedEvent::Message {
                topic: publish.topic.clone(),
                payload: publish.payload.to_vec(),
            }),
            Ok(Event::Incoming(Packet::Disconnect)) => {
                info!("Broker closed the MQTT session");
                Some(FeedEvent::Closed)
            }
            Ok(_) => None,
            Err(e) => {
                let delay = backoff.next_delay();
                error!("MQTT connection error: {} (retrying in {:?})", e, delay);
                if tx.send(FeedEvent::Error(e.to_string())).await.is_err() {
                    return;
                }
                tokio::time::sleep(delay).await;
                None
            }
        };

        if let Some(event) = event {
            if tx.send(event).await.is_err() {
                debug!("Feed receiver dropped, stopping MQTT event loop");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_tcp_url() {
        let mut config = FeedConfig::new("mqtt://broker.local:1884");
        config.client_id = Some("dash".into());
        config.username = Some("user".into());
        config.password = Some("secret".into());

        let options = mqtt_options(&config).unwrap();
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
        assert_eq!(options.client_id(), "dash");
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert_eq!(
            options.credentials(),
            Some(("user".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_options_default_ports() {
        let options = mqtt_options(&FeedConfig::new("mqtt://broker")).unwrap();
        assert_eq!(options.broker_address().1, 1883);

        let options = mqtt_options(&FeedConfig::new("mqtts://broker")).unwrap();
        assert_eq!(options.broker_address().1, 8883);
    }

    #[test]
    fn test_options_reject_bad_urls() {
        assert!(matches!(
            mqtt_options(&FeedConfig::new("http://broker")),
            Err(FeedError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            mqtt_options(&FeedConfig::new("not a url")),
            Err(FeedError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_unconnected_feed_has_no_events() {
        let mut feed = MqttFeed::new(FeedConfig::new("mqtt://broker"));
        assert_eq!(feed.next_event().await, None);
        feed.disconnect().await;
    }
}
