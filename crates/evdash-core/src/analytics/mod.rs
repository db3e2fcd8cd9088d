//! Historical Analytics
//!
//! Range-filtered queries against the historical service, turned into
//! labelled series with the same derived channels the live view uses.
//!
//! ## Usage
//!
//! ```ignore
//! let service = HttpQueryService::new("http://localhost:3000", "ve4")?;
//! let pipeline = QueryPipeline::new(service);
//! let range = DateRange::from_dates(start, end)?;
//! match pipeline.fetch_series(MetricSet::Power, Some(range)).await {
//!     QueryOutcome::Ready(series) => render(series.resample(200)),
//!     QueryOutcome::Empty => show_no_data(),
//!     QueryOutcome::Failed(e) => show_error(e),
//! }
//! ```

mod error;
mod pipeline;
mod query;
mod session;

pub use error::QueryError;
pub use pipeline::{QueryOutcome, QueryPipeline, QueryResult};
pub use query::{HttpQueryService, QueryService, DEFAULT_TIMEOUT};
pub use session::{AnalyticsSession, QueryState, SessionState};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::realtime::derived::{
    acceleration_series, drive_mode_name, power_from_voltage_current, speed_from_rotation_rate,
    RateSample,
};
use crate::telemetry::HistoricalRow;

/// Request date format, sent verbatim without timezone conversion
pub const REQUEST_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Chart axis label format, e.g. `Jan 5, 3:04 PM`
pub const LABEL_FORMAT: &str = "%b %-d, %-I:%M %p";

/// Metric groups offered by the historical service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricSet {
    RpmVsSoc,
    BatteryHealth,
    Power,
    Thermal,
    Acceleration,
    ModeDistribution,
}

impl MetricSet {
    pub const ALL: [MetricSet; 6] = [
        MetricSet::RpmVsSoc,
        MetricSet::BatteryHealth,
        MetricSet::Power,
        MetricSet::Thermal,
        MetricSet::Acceleration,
        MetricSet::ModeDistribution,
    ];

    /// Path segment used by the service
    pub fn slug(&self) -> &'static str {
        match self {
            MetricSet::RpmVsSoc => "rpm-vs-soc",
            MetricSet::BatteryHealth => "battery-health",
            MetricSet::Power => "power",
            MetricSet::Thermal => "thermal",
            MetricSet::Acceleration => "acceleration",
            MetricSet::ModeDistribution => "mode-distribution",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MetricSet::RpmVsSoc => "RPM vs SOC",
            MetricSet::BatteryHealth => "Battery Health",
            MetricSet::Power => "Power Consumption",
            MetricSet::Thermal => "Thermal Performance",
            MetricSet::Acceleration => "Acceleration",
            MetricSet::ModeDistribution => "Mode Distribution",
        }
    }

    /// Endpoint path for a vehicle model
    pub fn endpoint_path(&self, model: &str) -> String {
        format!("/api/data/{}/analytics/{}", model, self.slug())
    }
}

impl fmt::Display for MetricSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for MetricSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricSet::ALL
            .iter()
            .copied()
            .find(|m| m.slug() == s)
            .ok_or_else(|| format!("unknown metric '{}'", s))
    }
}

/// An inclusive query window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DateRange {
    /// Create a range; `start` must not be after `end`
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, QueryError> {
        if start > end {
            return Err(QueryError::InvalidRange {
                start: start.format(REQUEST_DATE_FORMAT).to_string(),
                end: end.format(REQUEST_DATE_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Range between two picked dates, both at midnight
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self, QueryError> {
        Self::new(start.and_time(chrono::NaiveTime::MIN), end.and_time(chrono::NaiveTime::MIN))
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// `{startDate, endDate}` request body
    pub fn request_body(&self) -> serde_json::Value {
        serde_json::json!({
            "startDate": self.start.format(REQUEST_DATE_FORMAT).to_string(),
            "endDate": self.end.format(REQUEST_DATE_FORMAT).to_string(),
        })
    }

    /// `YYYY-MM-DD to YYYY-MM-DD`
    pub fn describe(&self) -> String {
        format!(
            "{} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Request body for an optional range; `{}` asks for the service default
pub fn request_body(range: Option<&DateRange>) -> serde_json::Value {
    match range {
        Some(range) => range.request_body(),
        None => serde_json::json!({}),
    }
}

/// One historical row with its label and derived channels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRow {
    #[serde(flatten)]
    pub row: HistoricalRow,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<f64>,
}

/// A labelled result set for one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSeries {
    pub metric: MetricSet,
    #[serde(skip)]
    pub range: Option<DateRange>,
    pub rows: Vec<SeriesRow>,
}

impl AnalyticsSeries {
    /// Label rows and compute the metric's derived channels.
    ///
    /// Rows stay in the order given.
    pub fn from_rows(metric: MetricSet, range: Option<DateRange>, rows: Vec<HistoricalRow>) -> Self {
        let accelerations = if metric == MetricSet::Acceleration {
            let samples: Vec<RateSample> = rows
                .iter()
                .map(|r| RateSample::new(r.fields.rpm.unwrap_or_default(), r.received_at))
                .collect();
            acceleration_series(&samples)
        } else {
            Vec::new()
        };

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let power_w = match metric {
                    MetricSet::Power | MetricSet::Thermal => match (row.fields.volt, row.fields.amp) {
                        (Some(volt), Some(amp)) => Some(power_from_voltage_current(volt, amp)),
                        _ => None,
                    },
                    _ => None,
                };
                let (speed_kmh, acceleration) = if metric == MetricSet::Acceleration {
                    (
                        Some(speed_from_rotation_rate(row.fields.rpm.unwrap_or_default())),
                        accelerations.get(i).copied(),
                    )
                } else {
                    (None, None)
                };
                SeriesRow {
                    label: row.received_at.format(LABEL_FORMAT).to_string(),
                    row,
                    power_w,
                    speed_kmh,
                    acceleration,
                }
            })
            .collect();

        Self {
            metric,
            range,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.label.as_str()).collect()
    }

    /// Reduce to at most `max_points` evenly spaced rows.
    ///
    /// The first and last rows are always kept. Derived channels are not
    /// recomputed, so they still reflect the full series.
    pub fn resample(&self, max_points: usize) -> AnalyticsSeries {
        let n = self.rows.len();
        let target = max_points.max(2);
        if n <= target {
            return self.clone();
        }

        let rows = (0..target)
            .map(|i| {
                let index = (i * (n - 1) + (target - 1) / 2) / (target - 1);
                self.rows[index].clone()
            })
            .collect();

        AnalyticsSeries {
            metric: self.metric,
            range: self.range,
            rows,
        }
    }
}

/// Raw mode-distribution row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeCount {
    pub vmode: i64,
    pub count: u64,
}

/// Share of time spent in one drive mode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeShare {
    pub vmode: i64,
    pub count: u64,
    pub name: String,
    /// Percentage of all counted samples
    pub share: f64,
}

impl ModeShare {
    /// Name each mode and compute its share of the total
    pub fn from_counts(counts: &[ModeCount]) -> Vec<ModeShare> {
        let total: u64 = counts.iter().map(|c| c.count).sum();
        counts
            .iter()
            .map(|c| ModeShare {
                vmode: c.vmode,
                count: c.count,
                name: drive_mode_name(c.vmode)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Mode {}", c.vmode)),
                share: if total > 0 {
                    c.count as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::PartialSample;
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn power_row(ts: NaiveDateTime, volt: f64, amp: f64) -> HistoricalRow {
        HistoricalRow::new(
            ts,
            PartialSample {
                volt: Some(volt),
                amp: Some(amp),
                ..PartialSample::default()
            },
        )
    }

    #[test]
    fn test_metric_slugs_round_trip() {
        for metric in MetricSet::ALL {
            assert_eq!(metric.slug().parse::<MetricSet>().unwrap(), metric);
        }
        assert!("speed".parse::<MetricSet>().is_err());
        assert_eq!(
            MetricSet::RpmVsSoc.endpoint_path("in40"),
            "/api/data/in40/analytics/rpm-vs-soc"
        );
    }

    #[test]
    fn test_date_range_body() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let range = DateRange::from_dates(start, end).unwrap();

        assert_eq!(
            range.request_body(),
            serde_json::json!({"startDate": "2025-01-01 00:00:00", "endDate": "2025-01-31 00:00:00"})
        );
        assert_eq!(range.describe(), "2025-01-01 to 2025-01-31");
        assert_eq!(request_body(None), serde_json::json!({}));

        assert!(matches!(
            DateRange::from_dates(end, start),
            Err(QueryError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_series_labels_and_power() {
        let series = AnalyticsSeries::from_rows(
            MetricSet::Power,
            None,
            vec![power_row(at(15, 4, 0), 48.0, 10.0), power_row(at(9, 30, 0), 50.0, -2.0)],
        );

        assert_eq!(series.labels(), vec!["Jan 5, 3:04 PM", "Jan 5, 9:30 AM"]);
        assert_eq!(series.rows[0].power_w, Some(480.0));
        assert_eq!(series.rows[1].power_w, Some(-100.0));
        assert_eq!(series.rows[0].acceleration, None);
    }

    #[test]
    fn test_series_acceleration() {
        let rows = [0.0, 396.0, 396.0]
            .iter()
            .enumerate()
            .map(|(i, rpm)| {
                HistoricalRow::new(
                    at(12, 0, (i * 2) as u32),
                    PartialSample {
                        rpm: Some(*rpm),
                        ..PartialSample::default()
                    },
                )
            })
            .collect();
        let series = AnalyticsSeries::from_rows(MetricSet::Acceleration, None, rows);

        let accel: Vec<f64> = series.rows.iter().map(|r| r.acceleration.unwrap()).collect();
        assert_eq!(accel[0], 0.0);
        assert!((accel[1] - 5.0).abs() < 1e-9);
        assert_eq!(accel[2], 0.0);
        assert_eq!(series.rows[1].speed_kmh, Some(36.0));
    }

    #[test]
    fn test_resample_keeps_endpoints() {
        let rows = (0..100)
            .map(|i| power_row(at(10, i / 60, i % 60), 48.0, i as f64))
            .collect();
        let series = AnalyticsSeries::from_rows(MetricSet::Power, None, rows);

        let reduced = series.resample(10);
        assert_eq!(reduced.len(), 10);
        assert_eq!(reduced.rows.first(), series.rows.first());
        assert_eq!(reduced.rows.last(), series.rows.last());
        // Derived values come from the full series
        assert_eq!(reduced.rows[9].power_w, Some(48.0 * 99.0));

        assert_eq!(series.resample(500).len(), 100);
        assert_eq!(series.resample(0).len(), 2);
    }

    #[test]
    fn test_mode_shares() {
        let shares = ModeShare::from_counts(&[
            ModeCount { vmode: 1, count: 30 },
            ModeCount { vmode: 3, count: 10 },
            ModeCount { vmode: 7, count: 0 },
        ]);
        assert_eq!(shares[0].name, "Eco");
        assert_eq!(shares[0].share, 75.0);
        assert_eq!(shares[1].name, "Sports");
        assert_eq!(shares[2].name, "Mode 7");
        assert_eq!(shares[2].share, 0.0);
    }
}
