//! # EV Dash Core Library
//!
//! Core functionality for the EV Dash telemetry dashboard.

#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A live state engine fed by an MQTT telemetry stream, with partial-update
//!   merging, a staleness watchdog and a safe fallback state
//! - Derived channels (speed, power, range, acceleration) shared by the live
//!   and historical paths
//! - Range-filtered historical queries with last-request-wins sessions and
//!   resampling
//! - CSV and PDF report export
//!
//! ## Supported Vehicles
//!
//! - IN40 (reports speed directly)
//! - VE4 (speed computed from motor rpm)
//!
//! ## Example
//!
//! ```rust,ignore
//! use evdash_core::prelude::*;
//!
//! let config = DashboardConfig::load(DashboardConfig::default_path()?)?;
//! let profile = config.vehicle("ve4")?;
//!
//! let mut engine = LiveEngine::new(&profile.id, profile.engine.clone());
//! engine.start(MqttFeed::new(profile.feed.clone()));
//!
//! let mut updates = engine.subscribe();
//! while updates.changed().await.is_ok() {
//!     let derived = engine.derived();
//!     println!("{:.0} km/h, {:.1} km range", derived.speed_kmh, derived.range_km);
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod export;
pub mod feed;
pub mod realtime;
pub mod telemetry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analytics::{
        AnalyticsSeries, AnalyticsSession, DateRange, HttpQueryService, MetricSet, QueryOutcome,
        QueryPipeline, QueryState,
    };
    pub use crate::config::{DashboardConfig, VehicleProfile};
    pub use crate::export::{ColumnSpec, ExportFormat, ReportMeta};
    pub use crate::feed::{ChannelFeed, DemoFeed, FeedClient, FeedConfig, FeedEvent, MqttFeed};
    pub use crate::realtime::{DerivedChannels, EngineConfig, LiveEngine, LiveState};
    pub use crate::telemetry::{PartialSample, VehicleSample};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
