//! Derived Channels
//!
//! Computes speed, power, range, acceleration and display values from raw
//! sample fields. Both the live engine and the analytics pipeline go through
//! these functions so the two views always agree.
//!
//! Every function is total: bad input yields a neutral value, never a panic.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::telemetry::{DiagnosticEntry, VehicleSample};

/// Motor revolutions per minute per km/h (drivetrain calibration)
pub const RPM_PER_KMH: f64 = 11.0;

/// Range at 100% state of charge, in km
pub const FULL_CHARGE_RANGE_KM: f64 = 97.0;

/// Top of the speed gauge, in km/h
pub const GAUGE_MAX_KMH: f64 = 120.0;

/// Convert km/h to m/s
pub fn kmh_to_ms(kmh: f64) -> f64 {
    kmh / 3.6
}

/// Road speed in km/h from motor rotational rate.
///
/// Anything that is not a finite positive number reads as standstill.
pub fn speed_from_rotation_rate(rpm: f64) -> f64 {
    if !rpm.is_finite() || rpm <= 0.0 {
        return 0.0;
    }
    rpm / RPM_PER_KMH
}

/// Estimated remaining range in km for a state of charge in percent
pub fn range_from_charge(soc: f64) -> f64 {
    Calibration::default().range_from_charge(soc)
}

/// Electrical power in watts
pub fn power_from_voltage_current(volt: f64, amp: f64) -> f64 {
    volt * amp
}

/// Fill level of the speed gauge in percent
pub fn gauge_percentage(speed: f64) -> f64 {
    Calibration::default().gauge_percentage(speed)
}

/// A rotational-rate reading with the time it was taken
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    pub rpm: f64,
    pub at: NaiveDateTime,
}

impl RateSample {
    pub fn new(rpm: f64, at: NaiveDateTime) -> Self {
        Self { rpm, at }
    }
}

/// Acceleration in m/s² between two consecutive readings.
///
/// Returns 0 when the readings are not strictly ordered in time.
pub fn acceleration_from_consecutive_samples(prev: &RateSample, curr: &RateSample) -> f64 {
    let dt_seconds = (curr.at - prev.at).num_milliseconds() as f64 / 1000.0;
    if dt_seconds <= 0.0 {
        return 0.0;
    }
    let prev_ms = kmh_to_ms(speed_from_rotation_rate(prev.rpm));
    let curr_ms = kmh_to_ms(speed_from_rotation_rate(curr.rpm));
    let accel = (curr_ms - prev_ms) / dt_seconds;
    if accel.is_finite() {
        accel
    } else {
        0.0
    }
}

/// Acceleration for every reading of a sequence; the first reading is 0
pub fn acceleration_series(samples: &[RateSample]) -> Vec<f64> {
    let mut out = Vec::with_capacity(samples.len());
    if !samples.is_empty() {
        out.push(0.0);
    }
    for pair in samples.windows(2) {
        out.push(acceleration_from_consecutive_samples(&pair[0], &pair[1]));
    }
    out
}

/// Render a diagnostic code list. Never returns an empty list.
pub fn diagnostic_messages(codes: Option<&[i64]>) -> Vec<DiagnosticEntry> {
    match codes {
        Some(codes) if !codes.is_empty() => {
            codes.iter().map(|&code| DiagnosticEntry::for_code(code)).collect()
        }
        _ => vec![DiagnosticEntry::no_errors()],
    }
}

/// Display name for a drive mode code
pub fn drive_mode_name(vmode: i64) -> Option<&'static str> {
    match vmode {
        1 => Some("Eco"),
        2 => Some("Normal"),
        3 => Some("Sports"),
        4 => Some("Boost"),
        5 => Some("Reverse"),
        _ => None,
    }
}

/// Live-view text for a status flag
pub fn status_text(active: bool) -> &'static str {
    if active {
        "Active"
    } else {
        "Inactive"
    }
}

/// Colour band of the speed gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedBand {
    None,
    Low,
    Normal,
    Elevated,
    High,
    Critical,
}

/// Band for a speed in km/h
pub fn speed_band(speed: f64) -> SpeedBand {
    if speed > 80.0 {
        SpeedBand::Critical
    } else if speed > 60.0 {
        SpeedBand::High
    } else if speed > 40.0 {
        SpeedBand::Elevated
    } else if speed > 20.0 {
        SpeedBand::Normal
    } else if speed >= 10.0 {
        SpeedBand::Low
    } else {
        SpeedBand::None
    }
}

/// Calibration constants for range and gauge display
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Range at full charge in km
    pub full_charge_range_km: f64,
    /// Top of the speed gauge in km/h
    pub gauge_max_kmh: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            full_charge_range_km: FULL_CHARGE_RANGE_KM,
            gauge_max_kmh: GAUGE_MAX_KMH,
        }
    }
}

impl Calibration {
    pub fn range_from_charge(&self, soc: f64) -> f64 {
        if soc.is_nan() || soc < 0.0 {
            return 0.0;
        }
        (soc / 100.0) * self.full_charge_range_km
    }

    pub fn gauge_percentage(&self, speed: f64) -> f64 {
        if speed.is_nan() || speed <= 0.0 || self.gauge_max_kmh <= 0.0 {
            return 0.0;
        }
        speed.min(self.gauge_max_kmh) / self.gauge_max_kmh * 100.0
    }
}

/// Where a vehicle's speed reading comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedSource {
    /// The controller reports `speed` directly
    Reported,
    /// Speed is computed from `rpm`
    #[default]
    RotationRate,
}

/// Every live-view channel computed from one sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedChannels {
    pub speed_kmh: f64,
    pub gauge_percent: f64,
    pub speed_band: SpeedBand,
    pub power_w: f64,
    pub range_km: f64,
    pub mode_name: &'static str,
    pub diagnostics: Vec<DiagnosticEntry>,
}

impl DerivedChannels {
    /// Compute all channels for a sample
    pub fn from_sample(sample: &VehicleSample, source: SpeedSource, calibration: &Calibration) -> Self {
        let speed_kmh = match source {
            SpeedSource::Reported if sample.speed.is_finite() && sample.speed > 0.0 => sample.speed,
            SpeedSource::Reported => 0.0,
            SpeedSource::RotationRate => speed_from_rotation_rate(sample.rpm),
        };
        Self {
            speed_kmh,
            gauge_percent: calibration.gauge_percentage(speed_kmh),
            speed_band: speed_band(speed_kmh),
            power_w: power_from_voltage_current(sample.volt, sample.amp),
            range_km: calibration.range_from_charge(sample.soc),
            mode_name: drive_mode_name(sample.vmode).unwrap_or("N/A"),
            diagnostics: diagnostic_messages(Some(&sample.diagnostics)),
        }
    }
}
