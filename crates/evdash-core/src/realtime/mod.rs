//! Live Telemetry
//!
//! The live side of the dashboard:
//! - [`derived`] - channels computed from raw samples (shared with analytics)
//! - [`store`] - the single-writer state machine holding the snapshot
//! - [`engine`] - the actor task that feeds the store from a [`FeedClient`](crate::feed::FeedClient)

pub mod derived;
mod engine;
mod store;

pub use derived::{Calibration, DerivedChannels, SpeedBand, SpeedSource};
pub use engine::{EngineConfig, LiveEngine};
pub use store::LiveStore;

use chrono::{DateTime, Local};
use tokio::time::Instant;

use crate::telemetry::{PartialSample, VehicleSample};

/// The current best-known vehicle state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveState {
    /// Merged sample; `VehicleSample::default()` when nothing is known
    pub sample: VehicleSample,
    /// Transport is connected
    pub connected: bool,
    /// When the last accepted message arrived
    pub last_message_at: Option<Instant>,
    /// Display clock, refreshed by the engine's clock timer
    pub clock: Option<DateTime<Local>>,
}

impl LiveState {
    /// Merge a partial update into the sample
    pub fn apply(&mut self, update: &PartialSample) {
        self.sample.merge(update);
    }

    /// Drop everything known about the vehicle
    pub fn reset_sample(&mut self) {
        self.sample = VehicleSample::safe_default();
        self.last_message_at = None;
    }

    /// True when the sample is the safe fallback
    pub fn is_safe_default(&self) -> bool {
        self.sample == VehicleSample::safe_default()
    }

    /// Derived channels for the current sample
    pub fn derived(&self, source: SpeedSource, calibration: &Calibration) -> DerivedChannels {
        DerivedChannels::from_sample(&self.sample, source, calibration)
    }

    /// Display clock text, e.g. `3:04:05 PM`
    pub fn clock_text(&self) -> String {
        self.clock
            .map(|c| c.format("%-I:%M:%S %p").to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_update_leaves_state_unchanged() {
        let mut state = LiveState::default();
        state.apply(&PartialSample::from_json(br#"{"soc": 42}"#).unwrap());
        let before = state.clone();

        state.apply(&PartialSample::from_json(b"{}").unwrap());
        assert_eq!(state, before);
    }

    #[test]
    fn test_reset_sample_keeps_connection() {
        let mut state = LiveState {
            connected: true,
            last_message_at: Some(Instant::now()),
            ..LiveState::default()
        };
        state.apply(&PartialSample::from_json(br#"{"vehicle_on": true}"#).unwrap());
        assert!(!state.is_safe_default());

        state.reset_sample();
        assert!(state.is_safe_default());
        assert!(state.connected);
        assert!(state.last_message_at.is_none());
    }
}
