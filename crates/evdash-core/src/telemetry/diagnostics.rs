//! Controller diagnostic codes

use serde::{Serialize, Serializer};
use std::fmt;

/// Known diagnostic codes and their messages
pub const DIAGNOSTIC_CODES: &[(i64, &str)] = &[
    (1001, "Pack Voltage High"),
    (1002, "Pack Undervoltage"),
    (1003, "Charge Overtemperature"),
    (1004, "Charge Low Temperature"),
    (1005, "Discharge Overtemperature"),
    (1006, "Discharge Low Temperature"),
    (1007, "Charge Overcurrent"),
    (1008, "Discharge Overcurrent"),
    (1009, "Battery Short Circuit"),
    (2001, "Battery Lock"),
    (2002, "Steering Lock"),
    (2003, "Side Stand"),
    (2004, "Charger Connected"),
    (5001, "MOSFET High Temperature"),
    (5002, "DC Bus Current High"),
    (5003, "High Phase Current U"),
    (5004, "High Phase Current V"),
    (5005, "High Phase Current W"),
    (5006, "MCU Board Overtemperature"),
    (5007, "DC Bus Overvoltage"),
    (5008, "DC Bus Undervoltage"),
    (5009, "Throttle Out of Range"),
    (5010, "Machine Overtemperature"),
    (5011, "Position Sensor Fault"),
];

/// Look up the message for a code, falling back to `Unknown Code: N`
pub fn diagnostic_message(code: i64) -> String {
    DIAGNOSTIC_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, message)| message.to_string())
        .unwrap_or_else(|| format!("Unknown Code: {}", code))
}

/// The code column of a diagnostic entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLabel {
    /// Synthetic entry shown when no codes are active
    Ok,
    Code(i64),
}

impl fmt::Display for DiagnosticLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLabel::Ok => write!(f, "OK"),
            DiagnosticLabel::Code(code) => write!(f, "{}", code),
        }
    }
}

impl Serialize for DiagnosticLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DiagnosticLabel::Ok => serializer.serialize_str("OK"),
            DiagnosticLabel::Code(code) => serializer.serialize_i64(*code),
        }
    }
}

/// A rendered diagnostic line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticEntry {
    pub code: DiagnosticLabel,
    pub message: String,
}

impl DiagnosticEntry {
    /// The entry shown when nothing is wrong
    pub fn no_errors() -> Self {
        Self {
            code: DiagnosticLabel::Ok,
            message: "No Errors".to_string(),
        }
    }

    pub fn for_code(code: i64) -> Self {
        Self {
            code: DiagnosticLabel::Code(code),
            message: diagnostic_message(code),
        }
    }

    /// Whether this entry is a real fault rather than the OK placeholder
    pub fn is_fault(&self) -> bool {
        matches!(self.code, DiagnosticLabel::Code(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_codes() {
        assert_eq!(diagnostic_message(1009), "Battery Short Circuit");
        assert_eq!(diagnostic_message(5011), "Position Sensor Fault");
        assert_eq!(diagnostic_message(42), "Unknown Code: 42");
        assert_eq!(diagnostic_message(-7), "Unknown Code: -7");
    }

    #[test]
    fn test_entry_serialization() {
        let ok = serde_json::to_string(&DiagnosticEntry::no_errors()).unwrap();
        assert_eq!(ok, r#"{"code":"OK","message":"No Errors"}"#);

        let fault = serde_json::to_string(&DiagnosticEntry::for_code(9999)).unwrap();
        assert_eq!(fault, r#"{"code":9999,"message":"Unknown Code: 9999"}"#);
    }
}
