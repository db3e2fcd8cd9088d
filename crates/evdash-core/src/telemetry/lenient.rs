//! Tolerant field decoders
//!
//! Controllers and the historical database disagree on how values are typed
//! (flags as 0/1, DECIMAL columns as strings). These accept the variants seen
//! in practice and reject everything else.

use chrono::NaiveDateTime;
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        // f64 parsing also accepts "NaN" and "inf"
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

pub(crate) fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => as_number(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected a number, got {}", describe(&value)))),
    }
}

pub(crate) fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(|v| Some(v != 0.0))
            .ok_or_else(|| D::Error::custom("flag is not a finite number")),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Ok(Some(true)),
            "false" | "0" | "off" => Ok(Some(false)),
            other => Err(D::Error::custom(format!("invalid flag '{}'", other))),
        },
        Some(other) => Err(D::Error::custom(format!(
            "expected a flag, got {}",
            describe(&other)
        ))),
    }
}

pub(crate) fn mode<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match number(deserializer)? {
        None => Ok(None),
        Some(v) if v.is_finite() && v.fract() == 0.0 => Ok(Some(v as i64)),
        Some(v) => Err(D::Error::custom(format!("mode code {} is not an integer", v))),
    }
}

pub(crate) fn codes<'de, D>(deserializer: D) -> Result<Option<Vec<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match as_number(item) {
                Some(v) if v.is_finite() && v.fract() == 0.0 => Ok(v as i64),
                _ => Err(D::Error::custom(format!(
                    "diagnostic code must be an integer, got {}",
                    item
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(D::Error::custom(format!(
            "expected a list of codes, got {}",
            describe(&other)
        ))),
    }
}

pub(crate) fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected text, got {}",
            describe(&other)
        ))),
    }
}

pub(crate) fn received_at<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    super::parse_timestamp(&raw).map_err(D::Error::custom)
}

pub(crate) fn serialize_received_at<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&ts.format("%Y-%m-%d %H:%M:%S").to_string())
}
