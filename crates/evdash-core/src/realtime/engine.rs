//! Live engine
//!
//! Owns a feed client and a [`LiveStore`] inside one spawned task. Feed
//! events, the staleness watchdog and the display clock are all handled in
//! that task's `select!` loop, so every mutation is serialized. Readers get
//! snapshots through a `watch` channel.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Calibration, DerivedChannels, LiveState, LiveStore, SpeedSource};
use crate::feed::FeedClient;

/// Default staleness threshold in seconds
pub const DEFAULT_STALE_AFTER_SECS: u64 = 70;

/// Live engine settings for one vehicle model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reset the sample after this long without a message
    pub stale_after_secs: u64,
    /// How often the watchdog checks for staleness (clamped to 1-5 s)
    pub watchdog_period_ms: u64,
    /// Display clock refresh period
    pub clock_period_ms: u64,
    pub speed_source: SpeedSource,
    pub calibration: Calibration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            watchdog_period_ms: 1000,
            clock_period_ms: 1000,
            speed_source: SpeedSource::default(),
            calibration: Calibration::default(),
        }
    }
}

impl EngineConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms.clamp(1000, 5000))
    }

    pub fn clock_period(&self) -> Duration {
        Duration::from_millis(self.clock_period_ms.max(100))
    }
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Lifecycle-scoped live state engine.
///
/// One engine per vehicle model; engines are independent of each other.
/// Dropping the engine cancels its task.
pub struct LiveEngine {
    name: String,
    config: EngineConfig,
    state_tx: Arc<watch::Sender<LiveState>>,
    running: Option<Running>,
}

impl LiveEngine {
    pub fn new(name: impl Into<String>, config: EngineConfig) -> Self {
        let (state_tx, _) = watch::channel(LiveState::default());
        Self {
            name: name.into(),
            config,
            state_tx: Arc::new(state_tx),
            running: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawn the engine task around `feed`.
    ///
    /// Returns false (and drops `feed`) if the engine is already running.
    /// Must be called from within a Tokio runtime.
    pub fn start<F: FeedClient>(&mut self, feed: F) -> bool {
        if self.is_running() {
            debug!(engine = %self.name, "Engine already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let store = LiveStore::new(self.config.stale_after());
        let actor = Actor {
            name: self.name.clone(),
            store,
            state_tx: self.state_tx.clone(),
            watchdog_period: self.config.watchdog_period(),
            clock_period: self.config.clock_period(),
        };

        info!(engine = %self.name, feed = %feed.describe(), "Starting live engine");
        let task = tokio::spawn(actor.run(feed, cancel.clone()));
        self.running = Some(Running { cancel, task });
        true
    }

    /// Stop the engine and wait for its task to finish.
    ///
    /// Once this returns no timer or feed handler runs any more and the
    /// published state is the disconnected safe default.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            error!(engine = %self.name, "Live engine task failed: {}", e);
        }
        self.state_tx.send_if_modified(|state| {
            let stopped = LiveState {
                clock: state.clock,
                ..LiveState::default()
            };
            if *state != stopped {
                *state = stopped;
                true
            } else {
                false
            }
        });
        info!(engine = %self.name, "Live engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|r| !r.task.is_finished())
            .unwrap_or(false)
    }

    /// Copy of the current state
    pub fn read(&self) -> LiveState {
        self.state_tx.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<LiveState> {
        self.state_tx.subscribe()
    }

    /// Derived channels for the current state
    pub fn derived(&self) -> DerivedChannels {
        self.read()
            .derived(self.config.speed_source, &self.config.calibration)
    }
}

impl Drop for LiveEngine {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
        }
    }
}

struct Actor {
    name: String,
    store: LiveStore,
    state_tx: Arc<watch::Sender<LiveState>>,
    watchdog_period: Duration,
    clock_period: Duration,
}

impl Actor {
    async fn run<F: FeedClient>(mut self, mut feed: F, cancel: CancellationToken) {
        let mut feed_open = match feed.connect().await {
            Ok(()) => true,
            Err(e) => {
                self.store.on_error(&e.to_string());
                self.publish();
                false
            }
        };

        let mut watchdog = interval(self.watchdog_period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut clock = interval(self.clock_period);
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                event = feed.next_event(), if feed_open => match event {
                    Some(event) => {
                        if self.store.handle_event(event, Instant::now()) {
                            self.publish();
                        }
                    }
                    None => {
                        warn!(engine = %self.name, "Feed ended");
                        feed_open = false;
                        self.store.on_disconnect();
                        self.publish();
                    }
                },

                _ = watchdog.tick() => {
                    if self.store.watchdog_tick(Instant::now()) {
                        self.publish();
                    }
                }

                _ = clock.tick() => {
                    self.store.tick_clock(chrono::Local::now());
                    self.publish();
                }
            }
        }

        feed.disconnect().await;
        self.store.on_disconnect();
        self.publish();
        debug!(engine = %self.name, "Live engine task exiting");
    }

    fn publish(&self) {
        let snapshot = self.store.snapshot();
        self.state_tx.send_if_modified(|state| {
            if *state != snapshot {
                *state = snapshot;
                true
            } else {
                false
            }
        });
    }
}
