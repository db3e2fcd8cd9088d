//! Tests for dashboard configuration files

use evdash_core::config::{ConfigError, DashboardConfig, VehicleProfile};
use evdash_core::realtime::SpeedSource;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[test]
fn test_save_and_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = DashboardConfig::default();
    config.vehicles[1].feed.url = "mqtts://broker.example.com".to_string();
    config.vehicles[1].engine.calibration.full_charge_range_km = 110.0;
    config.save(&path).unwrap();

    let loaded = DashboardConfig::open(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_load_missing_file_uses_builtin_profiles() {
    let dir = tempdir().unwrap();
    let config = DashboardConfig::load(dir.path().join("absent.json")).unwrap();
    assert_eq!(config.vehicle_ids(), vec!["in40", "ve4"]);
}

#[test]
fn test_invalid_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(DashboardConfig::open(&path), Err(ConfigError::Parse(_))));
}

#[test]
fn test_custom_profile() {
    let json = r#"{
        "vehicles": [{
            "id": "s1",
            "name": "S1 Pro",
            "feed": {"url": "ws://10.0.0.5:9001/mqtt", "topic": "s1/can"},
            "api_url": "http://10.0.0.5:3001",
            "engine": {"speed_source": "reported", "stale_after_secs": 30}
        }]
    }"#;
    let config: DashboardConfig = serde_json::from_str(json).unwrap();
    let profile: &VehicleProfile = config.vehicle("s1").unwrap();

    assert_eq!(profile.feed.topic, "s1/can");
    assert_eq!(profile.feed.keepalive_secs, 60);
    assert_eq!(profile.engine.speed_source, SpeedSource::Reported);
    assert_eq!(profile.engine.stale_after_secs, 30);
    assert_eq!(profile.engine.clock_period_ms, 1000);
}
