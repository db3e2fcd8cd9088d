//! Demo Mode - Simulated vehicle telemetry
//!
//! Generates plausible scooter telemetry for running the dashboard without a
//! broker. The simulated rider alternates between parking and short rides
//! (accelerate, cruise, brake).

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

use super::{FeedClient, FeedError, FeedEvent, DEFAULT_TOPIC};
use crate::realtime::derived::RPM_PER_KMH;
use crate::telemetry::PartialSample;

/// Usable pack energy in watt-hours
const PACK_CAPACITY_WH: f64 = 2000.0;

/// Rotational rate change limits in RPM/sec
const RPM_RISE_RATE: f64 = 120.0;
const RPM_FALL_RATE: f64 = 250.0;

/// Simulated vehicle state
pub struct DemoSimulator {
    /// Time when simulation started (ms)
    start_time_ms: Option<u64>,
    /// Last update time (ms)
    last_update_ms: u64,
    /// Time of next ride (ms from start)
    next_ride_at_ms: u64,
    ride: RidePhase,
    current_rpm: f64,
    cruise_rpm: f64,
    soc: f64,
    odometer: f64,
    vmode: i64,
    rng: StdRng,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RidePhase {
    Parked,
    Accelerate { start_ms: u64 },
    Cruise { start_ms: u64, duration_ms: u64 },
    Brake,
}

impl Default for DemoSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoSimulator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic simulator for reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut rng: StdRng) -> Self {
        let first_ride = rng.gen_range(3000..8000);
        Self {
            start_time_ms: None,
            last_update_ms: 0,
            next_ride_at_ms: first_ride,
            ride: RidePhase::Parked,
            current_rpm: 0.0,
            cruise_rpm: 0.0,
            soc: rng.gen_range(60.0..95.0),
            odometer: rng.gen_range(100.0..2500.0),
            vmode: 2,
            rng,
        }
    }

    /// Advance the simulation and produce the next update.
    ///
    /// `elapsed_ms` is any monotonically increasing millisecond clock.
    pub fn update(&mut self, elapsed_ms: u64) -> PartialSample {
        let start = *self.start_time_ms.get_or_insert(elapsed_ms);
        let sim_time = elapsed_ms.saturating_sub(start);
        let delta_ms = if self.last_update_ms > 0 {
            elapsed_ms.saturating_sub(self.last_update_ms)
        } else {
            0
        };
        self.last_update_ms = elapsed_ms;
        let dt = delta_ms as f64 / 1000.0;

        self.update_ride_phase(sim_time);

        let target_rpm = match self.ride {
            RidePhase::Parked | RidePhase::Brake => 0.0,
            RidePhase::Accelerate { .. } | RidePhase::Cruise { .. } => self.cruise_rpm,
        };
        let rate = if target_rpm > self.current_rpm {
            RPM_RISE_RATE
        } else {
            RPM_FALL_RATE
        };
        let max_change = rate * dt;
        let previous_rpm = self.current_rpm;
        self.current_rpm += (target_rpm - self.current_rpm).clamp(-max_change, max_change);

        let t = sim_time as f64 / 1000.0;
        let riding = !matches!(self.ride, RidePhase::Parked);
        let wobble = if matches!(self.ride, RidePhase::Cruise { .. }) {
            6.0 * (t * 0.9).sin() + 3.0 * (t * 2.3).sin()
        } else {
            0.0
        };
        let rpm = (self.current_rpm + wobble).max(0.0);

        // Pack current: traction load, extra while accelerating, regen while braking
        let accelerating = self.current_rpm > previous_rpm + 0.5;
        let amp = match self.ride {
            RidePhase::Parked => 0.4,
            RidePhase::Brake => -6.0 * (self.current_rpm / 300.0).min(1.0),
            _ => 2.0 + rpm / 35.0 + if accelerating { 22.0 } else { 0.0 },
        };
        let volt = 42.0 + 12.0 * (self.soc / 100.0) - amp * 0.05;

        let energy_wh = volt * amp * dt / 3600.0;
        self.soc = (self.soc - energy_wh / PACK_CAPACITY_WH * 100.0).clamp(0.0, 100.0);
        self.odometer += rpm / RPM_PER_KMH * dt / 3600.0;

        let btemp = 26.0 + 8.0 * (1.0 - (-t / 900.0).exp()) + amp.max(0.0) * 0.05;
        let mtemp = 28.0 + rpm / 25.0 + 2.0 * (t * 0.05).sin();

        PartialSample {
            vehicle_on: Some(true),
            motor_status: Some(riding),
            steer_lock: Some(false),
            bat_lock: Some(true),
            sstand: Some(!riding),
            bat_dock: Some(true),
            brake: Some(matches!(self.ride, RidePhase::Brake)),
            kill: Some(false),
            pbutton: Some(false),
            speed: Some(rpm / RPM_PER_KMH),
            rpm: Some(rpm.round()),
            vmode: Some(self.vmode),
            odometer: Some(self.odometer),
            charging: Some(false),
            soc: Some((self.soc * 10.0).round() / 10.0),
            btemp: Some(btemp.round()),
            mtemp: Some(mtemp.round()),
            diagnostics: Some(Vec::new()),
            volt: Some(volt),
            amp: Some(amp),
            timestamp: Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    fn update_ride_phase(&mut self, sim_time: u64) {
        const ACCELERATE_MS: u64 = 4000;

        match self.ride {
            RidePhase::Parked => {
                if sim_time >= self.next_ride_at_ms {
                    // 30 to 80 km/h
                    self.cruise_rpm = self.rng.gen_range(330.0..880.0);
                    self.vmode = if self.rng.gen_bool(0.3) { 3 } else { 2 };
                    self.ride = RidePhase::Accelerate { start_ms: sim_time };
                }
            }
            RidePhase::Accelerate { start_ms } => {
                if sim_time >= start_ms + ACCELERATE_MS {
                    let duration_ms = self.rng.gen_range(10_000..30_000);
                    self.ride = RidePhase::Cruise {
                        start_ms: sim_time,
                        duration_ms,
                    };
                }
            }
            RidePhase::Cruise {
                start_ms,
                duration_ms,
            } => {
                if sim_time >= start_ms + duration_ms {
                    self.ride = RidePhase::Brake;
                }
            }
            RidePhase::Brake => {
                if self.current_rpm <= 0.0 {
                    self.ride = RidePhase::Parked;
                    self.next_ride_at_ms = sim_time + self.rng.gen_range(5000..15000);
                }
            }
        }
    }
}

/// A feed that publishes simulated telemetry at a fixed period
pub struct DemoFeed {
    simulator: DemoSimulator,
    period: Duration,
    ticker: Option<Interval>,
    started: Option<tokio::time::Instant>,
    announced: bool,
}

impl DemoFeed {
    pub fn new(period: Duration) -> Self {
        Self::with_simulator(DemoSimulator::new(), period)
    }

    pub fn with_simulator(simulator: DemoSimulator, period: Duration) -> Self {
        Self {
            simulator,
            period: period.max(Duration::from_millis(10)),
            ticker: None,
            started: None,
            announced: false,
        }
    }
}

#[async_trait]
impl FeedClient for DemoFeed {
    async fn connect(&mut self) -> Result<(), FeedError> {
        if self.ticker.is_none() {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.ticker = Some(ticker);
            self.started = Some(tokio::time::Instant::now());
            self.announced = false;
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<FeedEvent> {
        let ticker = self.ticker.as_mut()?;
        if !self.announced {
            self.announced = true;
            return Some(FeedEvent::Connected);
        }
        ticker.tick().await;
        let elapsed_ms = self
            .started
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or_default();
        let update = self.simulator.update(elapsed_ms);
        match serde_json::to_vec(&update) {
            Ok(payload) => Some(FeedEvent::Message {
                topic: DEFAULT_TOPIC.to_string(),
                payload,
            }),
            Err(e) => Some(FeedEvent::Error(e.to_string())),
        }
    }

    async fn disconnect(&mut self) {
        self.ticker = None;
        self.started = None;
    }

    fn describe(&self) -> String {
        format!("demo every {:?}", self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulator_creates_full_samples() {
        let mut sim = DemoSimulator::seeded(7);
        let update = sim.update(0);

        assert_eq!(update.vehicle_on, Some(true));
        assert!(update.soc.is_some());
        assert!(update.volt.is_some());
        assert_eq!(update.diagnostics, Some(Vec::new()));
    }

    #[test]
    fn test_parked_at_start() {
        let mut sim = DemoSimulator::seeded(7);
        for ms in (0..2500).step_by(100) {
            let update = sim.update(ms);
            assert_eq!(update.rpm, Some(0.0));
            assert_eq!(update.sstand, Some(true));
        }
    }

    #[test]
    fn test_ride_moves_and_drains() {
        let mut sim = DemoSimulator::seeded(11);
        let first = sim.update(1);
        let mut max_rpm: f64 = 0.0;
        let mut last = first.clone();
        for ms in (1..60_000).step_by(200) {
            last = sim.update(ms);
            max_rpm = max_rpm.max(last.rpm.unwrap_or_default());
        }
        assert!(max_rpm > 100.0, "simulated ride never moved");
        assert!(last.odometer.unwrap() > first.odometer.unwrap());
        assert!(last.soc.unwrap() <= first.soc.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_demo_feed_announces_then_streams() {
        let mut feed = DemoFeed::with_simulator(DemoSimulator::seeded(3), Duration::from_millis(500));
        assert_eq!(feed.next_event().await, None);

        feed.connect().await.unwrap();
        assert_eq!(feed.next_event().await, Some(FeedEvent::Connected));
        match feed.next_event().await {
            Some(FeedEvent::Message { payload, .. }) => {
                let decoded = PartialSample::from_json(&payload).unwrap();
                assert_eq!(decoded.vehicle_on, Some(true));
            }
            other => panic!("unexpected event {:?}", other),
        }

        feed.disconnect().await;
        assert_eq!(feed.next_event().await, None);
    }
}
