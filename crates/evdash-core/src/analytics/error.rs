//! Analytics query errors

use thiserror::Error;

/// Errors from building or running a historical query
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },

    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Service returned HTTP {0}")]
    Status(u16),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("'{0}' is not supported by this query")]
    UnsupportedMetric(&'static str),
}

impl From<reqwest::Error> for QueryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            QueryError::Timeout
        } else if e.is_decode() {
            QueryError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            QueryError::Status(status.as_u16())
        } else {
            QueryError::Request(e.to_string())
        }
    }
}
