//! Export
//!
//! Writes an [`AnalyticsSeries`] out as delimited text or as a paginated PDF
//! report. Both formats take their cells from the same [`ColumnSpec`], so a
//! report's table, its chart and a CSV export of one series always agree.

pub mod chart;
mod delimited;
mod report;

pub use delimited::{parse_delimited_text, to_delimited_text, to_delimited_text_with, write_csv, DelimitedTable};
pub use report::{page_count, to_report, PAGE_HEIGHT_MM, PAGE_WIDTH_MM};

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::analytics::{AnalyticsSeries, MetricSet, SeriesRow};
use crate::telemetry::Field;

/// Time cell format, e.g. `Jan 5, 2025, 3:04 PM`
pub const TIME_FORMAT: &str = "%b %-d, %Y, %-I:%M %p";

/// Errors that can occur while exporting
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Nothing to export: the series is empty")]
    EmptySeries,

    #[error("No columns selected")]
    NoColumns,

    #[error("Chart image could not be decoded: {0}")]
    InvalidImage(String),

    #[error("Chart image could not be encoded: {0}")]
    ImageEncode(String),

    #[error("PDF generation failed: {0}")]
    Pdf(String),

    #[error("Malformed delimited text on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-separated values
    Csv,
    /// Paginated PDF report
    Pdf,
}

impl ExportFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "pdf" => Some(ExportFormat::Pdf),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }
}

/// Where a column's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// Row timestamp
    Time,
    /// A raw sample field
    Field(Field),
    /// Derived power in W
    Power,
    /// Derived speed in km/h
    Speed,
    /// Derived acceleration in m/s²
    Acceleration,
}

/// One exported column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub header: String,
    pub source: Column,
    /// Fixed number of decimals; `None` prints the value as is
    pub decimals: Option<usize>,
}

impl ColumnDef {
    pub fn new(header: &str, source: Column) -> Self {
        Self {
            header: header.to_string(),
            source,
            decimals: None,
        }
    }

    pub fn with_decimals(mut self, decimals: usize) -> Self {
        self.decimals = Some(decimals);
        self
    }

    /// Numeric value of this column for a row, `None` for time or absent data
    pub fn value(&self, row: &SeriesRow) -> Option<f64> {
        match self.source {
            Column::Time => None,
            Column::Field(field) => row.row.fields.numeric(field),
            Column::Power => row.power_w,
            Column::Speed => row.speed_kmh,
            Column::Acceleration => row.acceleration,
        }
    }

    /// Text of this column for a row; absent values are empty
    pub fn cell(&self, row: &SeriesRow) -> String {
        if self.source == Column::Time {
            return row.row.received_at.format(TIME_FORMAT).to_string();
        }
        match (self.value(row), self.decimals) {
            (Some(v), Some(decimals)) => format!("{:.*}", decimals, v),
            (Some(v), None) => format!("{}", v),
            (None, _) => String::new(),
        }
    }
}

/// Ordered column selection for an export
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub columns: Vec<ColumnDef>,
}

impl ColumnSpec {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    /// Standard columns for a metric; mode distribution has no time series
    pub fn for_metric(metric: MetricSet) -> Option<Self> {
        let time = ColumnDef::new("Time", Column::Time);
        let columns = match metric {
            MetricSet::Power => vec![time, ColumnDef::new("Power (W)", Column::Power).with_decimals(2)],
            MetricSet::Thermal => vec![
                time,
                ColumnDef::new("Power (W)", Column::Power).with_decimals(2),
                ColumnDef::new("Battery Temp (°C)", Column::Field(Field::BatteryTemp)),
                ColumnDef::new("Motor Temp (°C)", Column::Field(Field::MotorTemp)),
            ],
            MetricSet::BatteryHealth => vec![
                time,
                ColumnDef::new("SOC (%)", Column::Field(Field::Soc)),
                ColumnDef::new("Battery Temp (°C)", Column::Field(Field::BatteryTemp)),
            ],
            MetricSet::RpmVsSoc => vec![
                time,
                ColumnDef::new("SOC (%)", Column::Field(Field::Soc)),
                ColumnDef::new("RPM", Column::Field(Field::Rpm)),
            ],
            MetricSet::Acceleration => vec![
                time,
                ColumnDef::new("SOC (%)", Column::Field(Field::Soc)),
                ColumnDef::new("Acceleration (m/s²)", Column::Acceleration).with_decimals(2),
            ],
            MetricSet::ModeDistribution => return None,
        };
        Some(Self { columns })
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }

    /// Columns that carry numbers (everything except time)
    pub fn numeric(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.source != Column::Time)
    }

    /// Cells for one row in column order
    pub fn cells(&self, row: &SeriesRow) -> Vec<String> {
        self.columns.iter().map(|c| c.cell(row)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Title block of a report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportMeta {
    pub title: String,
    /// `Date Range: ...` or `Showing Latest N Readings`
    pub subtitle: String,
    /// Optional line naming the vehicle or when the report was made
    pub note: Option<String>,
}

impl ReportMeta {
    /// Default title block for a series
    pub fn for_series(series: &AnalyticsSeries) -> Self {
        let subtitle = match &series.range {
            Some(range) => format!("Date Range: {}", range.describe()),
            None => format!("Showing Latest {} Readings", series.len()),
        };
        Self {
            title: report_title(series.metric),
            subtitle,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

fn report_title(metric: MetricSet) -> String {
    format!("{} Report", metric.display_name())
}

fn file_stem(metric: MetricSet) -> &'static str {
    match metric {
        MetricSet::RpmVsSoc => "rpm_vs_soc",
        MetricSet::BatteryHealth => "battery_health",
        MetricSet::Power => "power_consumption",
        MetricSet::Thermal => "thermal_performance",
        MetricSet::Acceleration => "acceleration",
        MetricSet::ModeDistribution => "mode_distribution",
    }
}

/// Default download name, e.g. `power_consumption_data.csv`
pub fn default_file_name(metric: MetricSet, format: ExportFormat) -> String {
    match format {
        ExportFormat::Csv => format!("{}_data.csv", file_stem(metric)),
        ExportFormat::Pdf => format!("{}_report.pdf", file_stem(metric)),
    }
}

/// Reject inputs that cannot produce a meaningful export
pub(crate) fn check_exportable(series: &AnalyticsSeries, columns: &ColumnSpec) -> Result<(), ExportError> {
    if series.is_empty() {
        return Err(ExportError::EmptySeries);
    }
    if columns.is_empty() {
        return Err(ExportError::NoColumns);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::DateRange;
    use crate::telemetry::{HistoricalRow, PartialSample};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn thermal_series() -> AnalyticsSeries {
        let ts = NaiveDate::from_ymd_opt(2025, 1, 5)
            .unwrap()
            .and_hms_opt(15, 4, 0)
            .unwrap();
        AnalyticsSeries::from_rows(
            MetricSet::Thermal,
            None,
            vec![HistoricalRow::new(
                ts,
                PartialSample {
                    volt: Some(48.2),
                    amp: Some(10.0),
                    btemp: Some(31.0),
                    ..PartialSample::default()
                },
            )],
        )
    }

    #[test]
    fn test_thermal_cells() {
        let series = thermal_series();
        let spec = ColumnSpec::for_metric(MetricSet::Thermal).unwrap();
        assert_eq!(
            spec.headers(),
            vec!["Time", "Power (W)", "Battery Temp (°C)", "Motor Temp (°C)"]
        );
        assert_eq!(
            spec.cells(&series.rows[0]),
            vec!["Jan 5, 2025, 3:04 PM", "482.00", "31", ""]
        );
    }

    #[test]
    fn test_report_meta() {
        let mut series = thermal_series();
        let meta = ReportMeta::for_series(&series);
        assert_eq!(meta.title, "Thermal Performance Report");
        assert_eq!(meta.subtitle, "Showing Latest 1 Readings");

        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        series.range = Some(DateRange::from_dates(day, day).unwrap());
        assert_eq!(
            ReportMeta::for_series(&series).subtitle,
            "Date Range: 2025-01-01 to 2025-01-01"
        );
    }

    #[test]
    fn test_default_file_names() {
        assert_eq!(
            default_file_name(MetricSet::Power, ExportFormat::Csv),
            "power_consumption_data.csv"
        );
        assert_eq!(
            default_file_name(MetricSet::Power, ExportFormat::Pdf),
            "power_consumption_report.pdf"
        );
        assert_eq!(
            ExportFormat::from_extension(Path::new("out.PDF")),
            Some(ExportFormat::Pdf)
        );
        assert_eq!(ExportFormat::from_extension(Path::new("out.txt")), None);
        assert!(ColumnSpec::for_metric(MetricSet::ModeDistribution).is_none());
    }
}
