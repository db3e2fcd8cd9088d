//! Vehicle Telemetry Model
//!
//! The sample fields reported by the vehicle controllers, the partial updates
//! the feed delivers, and the rows returned by the historical service.

mod diagnostics;
mod lenient;

pub use diagnostics::{diagnostic_message, DiagnosticEntry, DiagnosticLabel, DIAGNOSTIC_CODES};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while decoding telemetry payloads
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// A complete vehicle sample.
///
/// `Default` is the safe fallback state: every flag off, every reading zero,
/// no diagnostics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleSample {
    /// Ignition
    pub vehicle_on: bool,
    /// Motor enabled
    pub motor_status: bool,
    /// Steering (handle) lock engaged
    pub steer_lock: bool,
    /// Battery lock engaged
    pub bat_lock: bool,
    /// Side stand down
    pub sstand: bool,
    /// Battery docked
    pub bat_dock: bool,
    pub brake: bool,
    /// Kill switch active
    pub kill: bool,
    /// Push button pressed
    pub pbutton: bool,
    /// Speed in km/h as reported by controllers that send it directly
    pub speed: f64,
    /// Motor rotational rate
    pub rpm: f64,
    /// Drive mode code
    pub vmode: i64,
    /// Odometer in km
    pub odometer: f64,
    pub charging: bool,
    /// State of charge in percent
    pub soc: f64,
    /// Battery temperature in °C
    pub btemp: f64,
    /// Motor temperature in °C
    pub mtemp: f64,
    /// Active diagnostic codes
    #[serde(rename = "DIAGNOSTICS")]
    pub diagnostics: Vec<i64>,
    /// Pack voltage
    pub volt: f64,
    /// Pack current
    pub amp: f64,
    /// Server-assigned timestamp, passed through verbatim
    pub timestamp: String,
}

impl VehicleSample {
    /// The all-zero / all-false fallback sample
    pub fn safe_default() -> Self {
        Self::default()
    }

    /// Merge a partial update; absent fields keep their current value
    pub fn merge(&mut self, update: &PartialSample) {
        update.apply_to(self);
    }
}

/// A partial update: every field is independently optional.
///
/// A key that is missing or `null` is absent. Flags accept booleans or 0/1,
/// numbers accept JSON numbers or numeric strings. Anything else rejects the
/// whole payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialSample {
    #[serde(deserialize_with = "lenient::flag", skip_serializing_if = "Option::is_none")]
    pub vehicle_on: Option<bool>,
    #[serde(deserialize_with = "lenient::flag", skip_serializing_if = "Option::is_none")]
    pub motor_status: Option<bool>,
    #[serde(deserialize_with = "lenient::flag", skip_serializing_if = "Option::is_none")]
    pub steer_lock: Option<bool>,
    #[serde(deserialize_with = "lenient::flag", skip_serializing_if = "Option::is_none")]
    pub bat_lock: Option<bool>,
    #[serde(deserialize_with = "lenient::flag", skip_serializing_if = "Option::is_none")]
    pub sstand: Option<bool>,
    #[serde(deserialize_with = "lenient::flag", skip_serializing_if = "Option::is_none")]
    pub bat_dock: Option<bool>,
    #[serde(deserialize_with = "lenient::flag", skip_serializing_if = "Option::is_none")]
    pub brake: Option<bool>,
    #[serde(deserialize_with = "lenient::flag", skip_serializing_if = "Option::is_none")]
    pub kill: Option<bool>,
    #[serde(deserialize_with = "lenient::flag", skip_serializing_if = "Option::is_none")]
    pub pbutton: Option<bool>,
    #[serde(deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub rpm: Option<f64>,
    #[serde(deserialize_with = "lenient::mode", skip_serializing_if = "Option::is_none")]
    pub vmode: Option<i64>,
    #[serde(deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub odometer: Option<f64>,
    #[serde(deserialize_with = "lenient::flag", skip_serializing_if = "Option::is_none")]
    pub charging: Option<bool>,
    #[serde(deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub soc: Option<f64>,
    #[serde(deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub btemp: Option<f64>,
    #[serde(deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub mtemp: Option<f64>,
    #[serde(
        rename = "DIAGNOSTICS",
        deserialize_with = "lenient::codes",
        skip_serializing_if = "Option::is_none"
    )]
    pub diagnostics: Option<Vec<i64>>,
    #[serde(deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub volt: Option<f64>,
    #[serde(deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub amp: Option<f64>,
    #[serde(deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl PartialSample {
    /// Decode a raw feed payload.
    ///
    /// The payload must be a JSON object; unknown keys are ignored.
    pub fn from_json(payload: &[u8]) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        match value {
            serde_json::Value::Object(_) => Ok(serde_json::from_value(value)?),
            serde_json::Value::Array(_) => Err(DecodeError::NotAnObject("array")),
            serde_json::Value::String(_) => Err(DecodeError::NotAnObject("string")),
            serde_json::Value::Number(_) => Err(DecodeError::NotAnObject("number")),
            serde_json::Value::Bool(_) => Err(DecodeError::NotAnObject("boolean")),
            serde_json::Value::Null => Err(DecodeError::NotAnObject("null")),
        }
    }

    /// True when the update carries no fields at all
    pub fn is_empty(&self) -> bool {
        self == &PartialSample::default()
    }

    /// Copy every present field onto `sample`
    pub fn apply_to(&self, sample: &mut VehicleSample) {
        if let Some(v) = self.vehicle_on {
            sample.vehicle_on = v;
        }
        if let Some(v) = self.motor_status {
            sample.motor_status = v;
        }
        if let Some(v) = self.steer_lock {
            sample.steer_lock = v;
        }
        if let Some(v) = self.bat_lock {
            sample.bat_lock = v;
        }
        if let Some(v) = self.sstand {
            sample.sstand = v;
        }
        if let Some(v) = self.bat_dock {
            sample.bat_dock = v;
        }
        if let Some(v) = self.brake {
            sample.brake = v;
        }
        if let Some(v) = self.kill {
            sample.kill = v;
        }
        if let Some(v) = self.pbutton {
            sample.pbutton = v;
        }
        if let Some(v) = self.speed {
            sample.speed = v;
        }
        if let Some(v) = self.rpm {
            sample.rpm = v;
        }
        if let Some(v) = self.vmode {
            sample.vmode = v;
        }
        if let Some(v) = self.odometer {
            sample.odometer = v;
        }
        if let Some(v) = self.charging {
            sample.charging = v;
        }
        if let Some(v) = self.soc {
            sample.soc = v;
        }
        if let Some(v) = self.btemp {
            sample.btemp = v;
        }
        if let Some(v) = self.mtemp {
            sample.mtemp = v;
        }
        if let Some(ref v) = self.diagnostics {
            sample.diagnostics = v.clone();
        }
        if let Some(v) = self.volt {
            sample.volt = v;
        }
        if let Some(v) = self.amp {
            sample.amp = v;
        }
        if let Some(ref v) = self.timestamp {
            sample.timestamp = v.clone();
        }
    }

    /// Read a numeric field by identifier. Flags read as 0/1.
    pub fn numeric(&self, field: Field) -> Option<f64> {
        let flag = |v: Option<bool>| v.map(|b| if b { 1.0 } else { 0.0 });
        match field {
            Field::VehicleOn => flag(self.vehicle_on),
            Field::MotorStatus => flag(self.motor_status),
            Field::SteerLock => flag(self.steer_lock),
            Field::BatLock => flag(self.bat_lock),
            Field::SideStand => flag(self.sstand),
            Field::BatDock => flag(self.bat_dock),
            Field::Brake => flag(self.brake),
            Field::Kill => flag(self.kill),
            Field::PushButton => flag(self.pbutton),
            Field::Speed => self.speed,
            Field::Rpm => self.rpm,
            Field::Mode => self.vmode.map(|m| m as f64),
            Field::Odometer => self.odometer,
            Field::Charging => flag(self.charging),
            Field::Soc => self.soc,
            Field::BatteryTemp => self.btemp,
            Field::MotorTemp => self.mtemp,
            Field::Voltage => self.volt,
            Field::Current => self.amp,
        }
    }
}

/// Scalar sample fields, addressable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    VehicleOn,
    MotorStatus,
    SteerLock,
    BatLock,
    SideStand,
    BatDock,
    Brake,
    Kill,
    PushButton,
    Speed,
    Rpm,
    Mode,
    Odometer,
    Charging,
    Soc,
    BatteryTemp,
    MotorTemp,
    Voltage,
    Current,
}

impl Field {
    /// Key used on the wire
    pub fn key(&self) -> &'static str {
        match self {
            Field::VehicleOn => "vehicle_on",
            Field::MotorStatus => "motor_status",
            Field::SteerLock => "steer_lock",
            Field::BatLock => "bat_lock",
            Field::SideStand => "sstand",
            Field::BatDock => "bat_dock",
            Field::Brake => "brake",
            Field::Kill => "kill",
            Field::PushButton => "pbutton",
            Field::Speed => "speed",
            Field::Rpm => "rpm",
            Field::Mode => "vmode",
            Field::Odometer => "odometer",
            Field::Charging => "charging",
            Field::Soc => "soc",
            Field::BatteryTemp => "btemp",
            Field::MotorTemp => "mtemp",
            Field::Voltage => "volt",
            Field::Current => "amp",
        }
    }
}

/// One persisted sample returned by the historical service.
///
/// Unlike live updates the server timestamp is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRow {
    #[serde(
        deserialize_with = "lenient::received_at",
        serialize_with = "lenient::serialize_received_at"
    )]
    pub received_at: NaiveDateTime,
    #[serde(flatten)]
    pub fields: PartialSample,
}

impl HistoricalRow {
    pub fn new(received_at: NaiveDateTime, fields: PartialSample) -> Self {
        Self {
            received_at,
            fields,
        }
    }
}

/// Parse the timestamp formats the historical service emits.
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, the `T`-separated form with optional
/// fractional seconds, and RFC 3339 (converted to its own wall-clock time).
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, DecodeError> {
    let trimmed = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }
    chrono::DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.naive_local())
        .map_err(|_| DecodeError::InvalidTimestamp(trimmed.to_string()))
}
