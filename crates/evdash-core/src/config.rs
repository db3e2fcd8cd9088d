//! Dashboard Configuration
//!
//! Per-vehicle-model profiles: broker settings, the analytics service URL and
//! live engine tuning. Stored as pretty JSON, by default at
//! `<config dir>/evdash/config.json`, with environment overrides of the form
//! `EVDASH_<MODEL>_MQTT_URL` applied on load.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::feed::FeedConfig;
use crate::realtime::{EngineConfig, SpeedSource};

/// Default analytics service
pub const DEFAULT_API_URL: &str = "http://localhost:3001";

/// Default broker
pub const DEFAULT_MQTT_URL: &str = "mqtt://localhost:1883";

/// Errors that can occur while loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,

    #[error("Unknown vehicle model '{0}'")]
    UnknownModel(String),
}

/// Settings for one vehicle model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleProfile {
    /// Model identifier used in endpoint paths and env overrides (`in40`, `ve4`)
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub feed: FeedConfig,
    /// Analytics service base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl VehicleProfile {
    /// Profile with default settings for a model id
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            feed: FeedConfig::new(DEFAULT_MQTT_URL),
            api_url: default_api_url(),
            engine: EngineConfig::default(),
        }
    }

    /// Controllers that report speed directly; watchdog every 5 s
    pub fn in40() -> Self {
        let mut profile = Self::new("in40", "IN40");
        profile.engine.speed_source = SpeedSource::Reported;
        profile.engine.watchdog_period_ms = 5000;
        profile
    }

    /// Speed computed from rpm; watchdog every 1 s
    pub fn ve4() -> Self {
        let mut profile = Self::new("ve4", "VE4");
        profile.engine.speed_source = SpeedSource::RotationRate;
        profile.engine.watchdog_period_ms = 1000;
        profile
    }

    /// Apply `EVDASH_<ID>_*` overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = format!("EVDASH_{}_", self.id.to_uppercase());
        let var = |suffix: &str| lookup(&format!("{}{}", prefix, suffix)).filter(|v| !v.is_empty());

        if let Some(url) = var("MQTT_URL") {
            self.feed.url = url;
        }
        if let Some(username) = var("MQTT_USERNAME") {
            self.feed.username = Some(username);
        }
        if let Some(password) = var("MQTT_PASSWORD") {
            self.feed.password = Some(password);
        }
        if let Some(client_id) = var("MQTT_CLIENT_ID") {
            self.feed.client_id = Some(client_id);
        }
        if let Some(topic) = var("MQTT_TOPIC") {
            self.feed.topic = topic;
        }
        if let Some(api_url) = var("API_URL") {
            self.api_url = api_url;
        }
    }
}

/// All dashboard settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Config format version
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub vehicles: Vec<VehicleProfile>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            vehicles: vec![VehicleProfile::in40(), VehicleProfile::ve4()],
        }
    }
}

impl DashboardConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join("evdash").join("config.json"))
    }

    /// Read a config file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: DashboardConfig = serde_json::from_str(&content)?;
        debug!(path = %path.as_ref().display(), vehicles = config.vehicles.len(), "Loaded config");
        Ok(config)
    }

    /// Read a config file if it exists, otherwise use the built-in profiles.
    ///
    /// Environment overrides are applied either way.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = if path.as_ref().exists() {
            Self::open(path)?
        } else {
            info!(path = %path.as_ref().display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for vehicle in &mut self.vehicles {
            vehicle.apply_overrides(&lookup);
        }
    }

    pub fn vehicle(&self, id: &str) -> Result<&VehicleProfile, ConfigError> {
        self.vehicles
            .iter()
            .find(|v| v.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| ConfigError::UnknownModel(id.to_string()))
    }

    pub fn vehicle_ids(&self) -> Vec<&str> {
        self.vehicles.iter().map(|v| v.id.as_str()).collect()
    }
}
