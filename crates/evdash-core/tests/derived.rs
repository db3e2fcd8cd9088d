//! Tests for derived channel formulas

use chrono::NaiveDate;
use evdash_core::realtime::derived::{
    acceleration_from_consecutive_samples, diagnostic_messages, drive_mode_name, gauge_percentage,
    kmh_to_ms, power_from_voltage_current, range_from_charge, speed_from_rotation_rate, status_text,
    Calibration, RateSample,
};
use evdash_core::telemetry::{DiagnosticEntry, DiagnosticLabel, PartialSample};

#[test]
fn test_reference_values() {
    assert_eq!(speed_from_rotation_rate(110.0), 10.0);
    assert_eq!(range_from_charge(50.0), 48.5);
    assert_eq!(power_from_voltage_current(48.0, 10.0), 480.0);
    assert!((kmh_to_ms(36.0) - 10.0).abs() < 1e-12);
}

#[test]
fn test_non_numeric_rpm_gives_zero_speed() {
    // A payload without rpm leaves the field absent
    let update = PartialSample::from_json(br#"{"soc": 80}"#).unwrap();
    let rpm = update.rpm.unwrap_or_default();
    assert_eq!(speed_from_rotation_rate(rpm), 0.0);
    assert_eq!(speed_from_rotation_rate(f64::NAN), 0.0);
    assert_eq!(speed_from_rotation_rate(0.0), 0.0);
}

#[test]
fn test_identical_timestamps_give_zero_acceleration() {
    let at = NaiveDate::from_ymd_opt(2025, 6, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let prev = RateSample::new(100.0, at);
    let curr = RateSample::new(900.0, at);
    assert_eq!(acceleration_from_consecutive_samples(&prev, &curr), 0.0);
}

#[test]
fn test_diagnostic_rendering() {
    let none = diagnostic_messages(Some(&[]));
    assert_eq!(none.len(), 1);
    assert_eq!(none[0].code, DiagnosticLabel::Ok);
    assert_eq!(none[0].message, "No Errors");
    assert_eq!(diagnostic_messages(None), none);

    let unknown = diagnostic_messages(Some(&[9999]));
    assert_eq!(
        unknown,
        vec![DiagnosticEntry {
            code: DiagnosticLabel::Code(9999),
            message: "Unknown Code: 9999".to_string(),
        }]
    );

    let known = diagnostic_messages(Some(&[1001, 2003]));
    assert_eq!(known[0].message, "Pack Voltage High");
    assert_eq!(known[1].message, "Side Stand");
}

#[test]
fn test_gauge_and_calibration() {
    assert_eq!(gauge_percentage(150.0), 100.0);
    assert_eq!(gauge_percentage(-3.0), 0.0);

    let custom = Calibration {
        full_charge_range_km: 120.0,
        gauge_max_kmh: 80.0,
    };
    assert_eq!(custom.range_from_charge(50.0), 60.0);
    assert_eq!(custom.gauge_percentage(40.0), 50.0);
}

#[test]
fn test_labels() {
    assert_eq!(drive_mode_name(1), Some("Eco"));
    assert_eq!(drive_mode_name(4), Some("Boost"));
    assert_eq!(drive_mode_name(5), Some("Reverse"));
    assert_eq!(drive_mode_name(0), None);
    assert_eq!(status_text(true), "Active");
    assert_eq!(status_text(false), "Inactive");
}
