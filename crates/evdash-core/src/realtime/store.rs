//! Live state machine
//!
//! `LiveStore` applies feed events, watchdog ticks and clock ticks to a
//! [`LiveState`]. It is synchronous and takes the current time as an
//! argument; the engine owns it and calls it from a single task.

use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::LiveState;
use crate::feed::FeedEvent;
use crate::telemetry::{DecodeError, PartialSample};

/// Single-writer owner of a [`LiveState`]
#[derive(Debug, Clone)]
pub struct LiveStore {
    state: LiveState,
    stale_after: Duration,
}

impl LiveStore {
    /// Create a store holding the safe default, disconnected
    pub fn new(stale_after: Duration) -> Self {
        Self {
            state: LiveState::default(),
            stale_after,
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Decode and merge one message payload.
    ///
    /// A payload that does not decode contributes nothing.
    pub fn on_message(&mut self, payload: &[u8], now: Instant) -> Result<(), DecodeError> {
        let update = match PartialSample::from_json(payload) {
            Ok(update) => update,
            Err(e) => {
                warn!("Dropping undecodable telemetry message: {}", e);
                return Err(e);
            }
        };
        self.apply(&update, now);
        Ok(())
    }

    /// Merge an already decoded update
    pub fn apply(&mut self, update: &PartialSample, now: Instant) {
        if !self.state.connected {
            debug!("First message since connect");
        }
        self.state.apply(update);
        self.state.last_message_at = Some(now);
        self.state.connected = true;
    }

    pub fn on_connect(&mut self) {
        if !self.state.connected {
            info!("Feed connected");
        }
        self.state.connected = true;
    }

    pub fn on_disconnect(&mut self) {
        if self.state.connected {
            info!("Feed disconnected, resetting live state");
        }
        self.disconnect();
    }

    /// Transport failure; treated like a disconnect
    pub fn on_error(&mut self, message: &str) {
        error!("Feed error: {}", message);
        self.disconnect();
    }

    fn disconnect(&mut self) {
        self.state.connected = false;
        self.state.reset_sample();
    }

    /// Reset the sample if no message arrived for longer than the threshold.
    ///
    /// Returns true when a reset happened. `connected` is left as is.
    pub fn watchdog_tick(&mut self, now: Instant) -> bool {
        if !self.state.connected {
            return false;
        }
        let Some(last) = self.state.last_message_at else {
            return false;
        };
        let silent_for = now.saturating_duration_since(last);
        if silent_for > self.stale_after {
            warn!(
                "No telemetry for {:?} (limit {:?}), resetting live state",
                silent_for, self.stale_after
            );
            self.state.reset_sample();
            return true;
        }
        false
    }

    /// Refresh the display clock
    pub fn tick_clock(&mut self, wall_time: DateTime<Local>) {
        self.state.clock = Some(wall_time);
    }

    /// Apply one feed event. Returns true when the state may have changed.
    pub fn handle_event(&mut self, event: FeedEvent, now: Instant) -> bool {
        match event {
            FeedEvent::Connected => {
                let changed = !self.state.connected;
                self.on_connect();
                changed
            }
            FeedEvent::Message { topic, payload } => {
                debug!(topic = %topic, bytes = payload.len(), "Telemetry message");
                self.on_message(&payload, now).is_ok()
            }
            FeedEvent::Closed => {
                self.on_disconnect();
                true
            }
            FeedEvent::Error(message) => {
                self.on_error(&message);
                true
            }
        }
    }

    pub fn state(&self) -> &LiveState {
        &self.state
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> LiveState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::VehicleSample;

    fn store() -> LiveStore {
        LiveStore::new(Duration::from_secs(70))
    }

    #[test]
    fn test_message_marks_connected() {
        let mut store = store();
        let now = Instant::now();
        store.on_message(br#"{"soc": 55}"#, now).unwrap();

        let state = store.snapshot();
        assert!(state.connected);
        assert_eq!(state.sample.soc, 55.0);
        assert_eq!(state.last_message_at, Some(now));
    }

    #[test]
    fn test_bad_message_leaves_state_untouched() {
        let mut store = store();
        let t0 = Instant::now();
        store.on_message(br#"{"soc": 55, "rpm": 300}"#, t0).unwrap();
        let before = store.snapshot();

        assert!(store.on_message(b"{\"soc\": 10, ", t0 + Duration::from_secs(1)).is_err());
        assert!(store.on_message(br#"{"soc": 10, "rpm": "fast"}"#, t0 + Duration::from_secs(2)).is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_non_finite_message_is_dropped() {
        let mut store = store();
        let t0 = Instant::now();
        store.on_message(br#"{"soc": 55, "amp": 4}"#, t0).unwrap();
        let before = store.snapshot();

        let later = t0 + Duration::from_secs(1);
        assert!(store
            .on_message(br#"{"soc": "NaN", "amp": "inf", "volt": "-infinity"}"#, later)
            .is_err());
        let state = store.snapshot();
        assert_eq!(state, before);
        assert!(state.sample.soc.is_finite() && state.sample.amp.is_finite());
    }

    #[test]
    fn test_watchdog_threshold() {
        let t0 = Instant::now();

        let mut store = store();
        store.on_connect();
        store.on_message(br#"{"vehicle_on": true}"#, t0).unwrap();
        assert!(!store.watchdog_tick(t0 + Duration::from_secs(69)));
        assert!(store.state().sample.vehicle_on);

        assert!(store.watchdog_tick(t0 + Duration::from_secs(71)));
        let state = store.snapshot();
        assert!(state.is_safe_default());
        assert!(state.connected);
        assert!(state.last_message_at.is_none());

        // Disarmed until the next message
        assert!(!store.watchdog_tick(t0 + Duration::from_secs(200)));
    }

    #[test]
    fn test_watchdog_at_exact_threshold_does_not_fire() {
        let t0 = Instant::now();
        let mut store = store();
        store.on_message(br#"{"soc": 1}"#, t0).unwrap();
        assert!(!store.watchdog_tick(t0 + Duration::from_secs(70)));
    }

    #[test]
    fn test_disconnect_resets() {
        let mut store = store();
        store.on_connect();
        store.on_message(br#"{"vehicle_on": true}"#, Instant::now()).unwrap();
        store.on_message(br#"{"soc": 80}"#, Instant::now()).unwrap();

        let state = store.snapshot();
        assert!(state.sample.vehicle_on);
        assert_eq!(state.sample.soc, 80.0);

        store.on_disconnect();
        let state = store.snapshot();
        assert_eq!(state.sample, VehicleSample::safe_default());
        assert!(!state.connected);
        assert!(state.last_message_at.is_none());
    }

    #[test]
    fn test_error_event_resets() {
        let mut store = store();
        store.handle_event(FeedEvent::Connected, Instant::now());
        store.handle_event(
            FeedEvent::Message {
                topic: "can/data".into(),
                payload: br#"{"amp": 12}"#.to_vec(),
            },
            Instant::now(),
        );
        assert_eq!(store.state().sample.amp, 12.0);

        assert!(store.handle_event(FeedEvent::Error("connection refused".into()), Instant::now()));
        assert!(store.state().is_safe_default());
        assert!(!store.state().connected);
    }

    #[test]
    fn test_clock_tick() {
        let mut store = store();
        let now = Local::now();
        store.tick_clock(now);
        assert_eq!(store.state().clock, Some(now));
        assert!(!store.state().clock_text().is_empty());
    }
}
