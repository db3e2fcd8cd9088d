//! EV Dash command-line front end
//!
//! `evdash live` follows a vehicle's telemetry feed and prints the derived
//! channels as they change. `evdash analytics` runs one historical query and
//! optionally exports the result as CSV or a PDF report.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use evdash_core::analytics::{
    AnalyticsSeries, AnalyticsSession, DateRange, HttpQueryService, MetricSet, QueryPipeline,
    QueryResult, QueryState,
};
use evdash_core::config::{DashboardConfig, VehicleProfile};
use evdash_core::export::chart::render_line_chart;
use evdash_core::export::{default_file_name, to_report, write_csv, ColumnSpec, ExportFormat, ReportMeta};
use evdash_core::feed::{DemoFeed, MqttFeed};
use evdash_core::realtime::{LiveEngine, LiveState};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Live and historical telemetry for electric-vehicle controllers
#[derive(Parser, Debug)]
#[command(name = "evdash")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Vehicle model id
    #[arg(short, long, global = true, default_value = "ve4")]
    model: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the live telemetry feed
    Live {
        /// Use the built-in simulator instead of the broker
        #[arg(long)]
        demo: bool,

        /// Simulator update period in milliseconds
        #[arg(long, default_value = "500")]
        demo_period_ms: u64,

        /// Print each update as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a historical query
    Analytics {
        /// Metric set (rpm-vs-soc, battery-health, power, thermal, acceleration, mode-distribution)
        metric: MetricSet,

        /// First day of the range (YYYY-MM-DD)
        #[arg(long, requires = "end")]
        start: Option<NaiveDate>,

        /// Last day of the range (YYYY-MM-DD)
        #[arg(long, requires = "start")]
        end: Option<NaiveDate>,

        /// Maximum number of readings in the PDF report (chart and table)
        #[arg(long, default_value = "200")]
        resample: usize,

        /// Write the rows as CSV (to the given path or the default file name)
        #[arg(long, value_name = "PATH", num_args = 0..=1)]
        csv: Option<Option<PathBuf>>,

        /// Write a PDF report (to the given path or the default file name)
        #[arg(long, value_name = "PATH", num_args = 0..=1)]
        pdf: Option<Option<PathBuf>>,
    },
    /// List the configured vehicle models
    Vehicles,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    let path = match args.config {
        Some(path) => path,
        None => DashboardConfig::default_path()?,
    };
    let config = DashboardConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    match args.command {
        Command::Vehicles => {
            for profile in &config.vehicles {
                println!("{:<8} {:<16} {}  {}", profile.id, profile.name, profile.feed.url, profile.api_url);
            }
            Ok(())
        }
        Command::Live {
            demo,
            demo_period_ms,
            json,
        } => {
            let profile = config.vehicle(&args.model)?;
            run_live(profile, demo, Duration::from_millis(demo_period_ms), json).await
        }
        Command::Analytics {
            metric,
            start,
            end,
            resample,
            csv,
            pdf,
        } => {
            let profile = config.vehicle(&args.model)?;
            let range = match (start, end) {
                (Some(start), Some(end)) => Some(DateRange::from_dates(start, end)?),
                (None, None) => None,
                _ => bail!("--start and --end must be given together"),
            };
            run_analytics(profile, metric, range, resample, csv, pdf).await
        }
    }
}

async fn run_live(profile: &VehicleProfile, demo: bool, period: Duration, json: bool) -> Result<()> {
    let mut engine = LiveEngine::new(&profile.id, profile.engine.clone());
    let started = if demo {
        engine.start(DemoFeed::new(period))
    } else {
        engine.start(MqttFeed::new(profile.feed.clone()))
    };
    if !started {
        bail!("engine for {} is already running", profile.id);
    }
    info!("Following {} ({})", profile.name, if demo { "demo" } else { profile.feed.url.as_str() });

    let mut updates = engine.subscribe();
    let mut last_connected = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if state.connected != last_connected {
                    last_connected = state.connected;
                    info!("{}", if state.connected { "Connected" } else { "Disconnected" });
                }
                print_live(&engine, &state, json)?;
            }
        }
    }

    engine.stop().await;
    Ok(())
}

fn print_live(engine: &LiveEngine, state: &LiveState, json: bool) -> Result<()> {
    let derived = state.derived(engine.config().speed_source, &engine.config().calibration);
    if json {
        println!(
            "{}",
            serde_json::json!({
                "time": state.clock_text(),
                "connected": state.connected,
                "sample": state.sample,
                "derived": derived,
            })
        );
        return Ok(());
    }

    let diagnostics: Vec<&str> = derived.diagnostics.iter().map(|d| d.message.as_str()).collect();
    println!(
        "{:>11}  {:5.1} km/h  {:5.1}% soc  {:6.0} W  {:5.1} km  {:<7}  {}",
        state.clock_text(),
        derived.speed_kmh,
        state.sample.soc,
        derived.power_w,
        derived.range_km,
        derived.mode_name,
        diagnostics.join(", ")
    );
    Ok(())
}

async fn run_analytics(
    profile: &VehicleProfile,
    metric: MetricSet,
    range: Option<DateRange>,
    max_points: usize,
    csv: Option<Option<PathBuf>>,
    pdf: Option<Option<PathBuf>>,
) -> Result<()> {
    let service = HttpQueryService::new(&profile.api_url, &profile.id)?;
    let mut session = AnalyticsSession::new(QueryPipeline::new(service));
    session.request(metric, range);

    match session.settled().await.state {
        QueryState::Ready(QueryResult::Series(series)) => {
            info!("{}: {} rows", metric.display_name(), series.len());
            export_series(profile, &series, max_points, csv, pdf)
        }
        QueryState::Ready(QueryResult::Modes(shares)) => {
            for share in &shares {
                println!("{:<10} {:>8} {:6.1}%", share.name, share.count, share.share);
            }
            if csv.is_some() || pdf.is_some() {
                warn!("Mode distribution has no tabular export");
            }
            Ok(())
        }
        QueryState::Empty => {
            info!("No data available for the selected range");
            Ok(())
        }
        QueryState::Failed(e) => Err(e).context("analytics query failed"),
        QueryState::Idle | QueryState::Loading => bail!("query did not complete"),
    }
}

fn export_series(
    profile: &VehicleProfile,
    series: &AnalyticsSeries,
    max_points: usize,
    csv: Option<Option<PathBuf>>,
    pdf: Option<Option<PathBuf>>,
) -> Result<()> {
    let Some(columns) = ColumnSpec::for_metric(series.metric) else {
        bail!("{} cannot be exported", series.metric);
    };

    if let Some(path) = csv {
        let path = output_path(path, series.metric, ExportFormat::Csv);
        write_csv(&path, series, &columns)?;
        info!("Wrote {}", path.display());
    }

    if let Some(path) = pdf {
        let path = output_path(path, series.metric, ExportFormat::Pdf);
        let (_, bytes) = render_report(series, &columns, max_points, &profile.name)?;
        std::fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote {}", path.display());
    }

    Ok(())
}

/// Build a PDF report. The chart, the subtitle and the table all come from
/// the same resampled series.
fn render_report(
    series: &AnalyticsSeries,
    columns: &ColumnSpec,
    max_points: usize,
    note: &str,
) -> Result<(ReportMeta, Vec<u8>)> {
    let shown = series.resample(max_points);
    let chart = render_line_chart(&shown, columns, 1600, 600)?;
    let meta = ReportMeta::for_series(&shown).with_note(note);
    let bytes = to_report(&shown, &chart, columns, &meta)?;
    Ok((meta, bytes))
}

/// A bare `--csv`/`--pdf` flag writes to the default file name
fn output_path(path: Option<PathBuf>, metric: MetricSet, format: ExportFormat) -> PathBuf {
    path.unwrap_or_else(|| PathBuf::from(default_file_name(metric, format)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use evdash_core::telemetry::HistoricalRow;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_analytics_args() {
        let args = Args::try_parse_from([
            "evdash", "--model", "in40", "analytics", "thermal", "--start", "2025-01-01", "--end",
            "2025-01-31", "--pdf",
        ])
        .unwrap();
        assert_eq!(args.model, "in40");
        match args.command {
            Command::Analytics { metric, start, pdf, csv, .. } => {
                assert_eq!(metric, MetricSet::Thermal);
                assert_eq!(start, NaiveDate::from_ymd_opt(2025, 1, 1));
                assert_eq!(pdf, Some(None));
                assert_eq!(csv, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_export_flags_with_and_without_paths() {
        let args = Args::try_parse_from([
            "evdash", "analytics", "power", "--csv", "--pdf", "out/report.pdf",
        ])
        .unwrap();
        match args.command {
            Command::Analytics { csv, pdf, .. } => {
                assert_eq!(
                    output_path(csv.unwrap(), MetricSet::Power, ExportFormat::Csv),
                    PathBuf::from("power_consumption_data.csv")
                );
                assert_eq!(pdf, Some(Some(PathBuf::from("out/report.pdf"))));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_start_requires_end() {
        assert!(Args::try_parse_from(["evdash", "analytics", "power", "--start", "2025-01-01"]).is_err());
    }

    #[test]
    fn test_output_path_defaults() {
        assert_eq!(
            output_path(None, MetricSet::Thermal, ExportFormat::Pdf),
            PathBuf::from("thermal_performance_report.pdf")
        );
        assert_eq!(
            output_path(Some(PathBuf::from("out.pdf")), MetricSet::Power, ExportFormat::Pdf),
            PathBuf::from("out.pdf")
        );
    }

    fn power_series(n: usize) -> AnalyticsSeries {
        let rows: Vec<HistoricalRow> = (0..n)
            .map(|i| {
                serde_json::from_value(serde_json::json!({
                    "received_at": format!("2025-02-10 {:02}:{:02}:00", 8 + i / 60, i % 60),
                    "volt": 50,
                    "amp": (i % 9) as f64,
                }))
                .unwrap()
            })
            .collect();
        AnalyticsSeries::from_rows(MetricSet::Power, None, rows)
    }

    #[test]
    fn test_report_chart_and_table_share_rows() {
        let series = power_series(500);
        let columns = ColumnSpec::for_metric(MetricSet::Power).unwrap();

        let (meta, bytes) = render_report(&series, &columns, 100, "VE4").unwrap();
        assert_eq!(meta.subtitle, "Showing Latest 100 Readings");
        assert_eq!(meta.note.as_deref(), Some("VE4"));
        assert!(bytes.starts_with(b"%PDF"));

        // Short series are reported whole
        let (meta, _) = render_report(&power_series(40), &columns, 100, "VE4").unwrap();
        assert_eq!(meta.subtitle, "Showing Latest 40 Readings");
    }
}
