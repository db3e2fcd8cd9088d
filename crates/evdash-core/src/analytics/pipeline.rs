//! Query pipeline
//!
//! Runs a query against a [`QueryService`] and decodes the response into an
//! [`AnalyticsSeries`] or mode shares.

use std::sync::Arc;
use tracing::{debug, warn};

use super::{AnalyticsSeries, DateRange, MetricSet, ModeCount, ModeShare, QueryError, QueryService};
use crate::telemetry::HistoricalRow;

/// Result of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome<T> {
    Ready(T),
    /// The service answered with no rows
    Empty,
    Failed(QueryError),
}

impl<T> QueryOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryOutcome<U> {
        match self {
            QueryOutcome::Ready(value) => QueryOutcome::Ready(f(value)),
            QueryOutcome::Empty => QueryOutcome::Empty,
            QueryOutcome::Failed(e) => QueryOutcome::Failed(e),
        }
    }

    pub fn ready(self) -> Option<T> {
        match self {
            QueryOutcome::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Data returned by any metric query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Series(AnalyticsSeries),
    Modes(Vec<ModeShare>),
}

/// Turns service responses into presentation-ready data
#[derive(Clone)]
pub struct QueryPipeline {
    service: Arc<dyn QueryService>,
}

impl QueryPipeline {
    pub fn new<S: QueryService>(service: S) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    pub fn from_shared(service: Arc<dyn QueryService>) -> Self {
        Self { service }
    }

    /// Fetch a time series metric
    pub async fn fetch_series(
        &self,
        metric: MetricSet,
        range: Option<DateRange>,
    ) -> QueryOutcome<AnalyticsSeries> {
        if metric == MetricSet::ModeDistribution {
            return QueryOutcome::Failed(QueryError::UnsupportedMetric(metric.slug()));
        }

        let rows: Vec<HistoricalRow> = match self.decode(metric, range).await {
            Ok(rows) => rows,
            Err(e) => return QueryOutcome::Failed(e),
        };
        if rows.is_empty() {
            debug!(metric = %metric, "Query returned no rows");
            return QueryOutcome::Empty;
        }

        debug!(metric = %metric, rows = rows.len(), "Query returned rows");
        QueryOutcome::Ready(AnalyticsSeries::from_rows(metric, range, rows))
    }

    /// Fetch the drive mode distribution
    pub async fn fetch_mode_distribution(&self, range: Option<DateRange>) -> QueryOutcome<Vec<ModeShare>> {
        let counts: Vec<ModeCount> = match self.decode(MetricSet::ModeDistribution, range).await {
            Ok(counts) => counts,
            Err(e) => return QueryOutcome::Failed(e),
        };
        if counts.is_empty() {
            return QueryOutcome::Empty;
        }
        QueryOutcome::Ready(ModeShare::from_counts(&counts))
    }

    /// Fetch any metric
    pub async fn fetch(&self, metric: MetricSet, range: Option<DateRange>) -> QueryOutcome<QueryResult> {
        match metric {
            MetricSet::ModeDistribution => self
                .fetch_mode_distribution(range)
                .await
                .map(QueryResult::Modes),
            _ => self.fetch_series(metric, range).await.map(QueryResult::Series),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        metric: MetricSet,
        range: Option<DateRange>,
    ) -> Result<Vec<T>, QueryError> {
        let value = self.service.query(metric, range).await.map_err(|e| {
            warn!(metric = %metric, "Analytics query failed: {}", e);
            e
        })?;
        serde_json::from_value(value).map_err(|e| {
            warn!(metric = %metric, "Undecodable analytics response: {}", e);
            QueryError::Decode(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(Result<serde_json::Value, QueryError>);

    #[async_trait]
    impl QueryService for Fixed {
        async fn query(
            &self,
            _metric: MetricSet,
            _range: Option<DateRange>,
        ) -> Result<serde_json::Value, QueryError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_empty_is_not_failure() {
        let pipeline = QueryPipeline::new(Fixed(Ok(serde_json::json!([]))));
        assert_eq!(pipeline.fetch_series(MetricSet::Power, None).await, QueryOutcome::Empty);
        assert_eq!(pipeline.fetch_mode_distribution(None).await, QueryOutcome::Empty);
    }

    #[tokio::test]
    async fn test_service_failure_surfaces() {
        let pipeline = QueryPipeline::new(Fixed(Err(QueryError::Status(502))));
        assert_eq!(
            pipeline.fetch_series(MetricSet::Thermal, None).await,
            QueryOutcome::Failed(QueryError::Status(502))
        );
    }

    #[tokio::test]
    async fn test_rows_without_timestamp_fail() {
        let pipeline = QueryPipeline::new(Fixed(Ok(serde_json::json!([
            {"received_at": "2025-01-05 10:00:00", "soc": 80},
            {"soc": 79}
        ]))));
        assert!(matches!(
            pipeline.fetch_series(MetricSet::BatteryHealth, None).await,
            QueryOutcome::Failed(QueryError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_dispatches_by_metric() {
        let pipeline = QueryPipeline::new(Fixed(Ok(serde_json::json!([
            {"vmode": 2, "count": 5}
        ]))));
        match pipeline.fetch(MetricSet::ModeDistribution, None).await {
            QueryOutcome::Ready(QueryResult::Modes(modes)) => {
                assert_eq!(modes.len(), 1);
                assert_eq!(modes[0].name, "Normal");
                assert_eq!(modes[0].share, 100.0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(
            pipeline.fetch_series(MetricSet::ModeDistribution, None).await,
            QueryOutcome::Failed(QueryError::UnsupportedMetric("mode-distribution"))
        );
    }
}
