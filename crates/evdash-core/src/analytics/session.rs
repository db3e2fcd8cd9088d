//! Last-request-wins query session
//!
//! A view issues queries as the user changes metric or date range. Only the
//! most recent request may update the published state: each request bumps a
//! generation, the previous in-flight task is aborted, and a finished task
//! applies its outcome only if its generation is still current. The check and
//! the update happen under the `watch` channel's lock, so a newer request
//! can never be overwritten by an older one.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{DateRange, MetricSet, QueryError, QueryOutcome, QueryPipeline, QueryResult};

/// Presentation state of a query
#[derive(Debug, Clone, PartialEq, Default)]
pub enum QueryState {
    #[default]
    Idle,
    Loading,
    Ready(QueryResult),
    Empty,
    Failed(QueryError),
}

impl QueryState {
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }
}

impl From<QueryOutcome<QueryResult>> for QueryState {
    fn from(outcome: QueryOutcome<QueryResult>) -> Self {
        match outcome {
            QueryOutcome::Ready(result) => QueryState::Ready(result),
            QueryOutcome::Empty => QueryState::Empty,
            QueryOutcome::Failed(e) => QueryState::Failed(e),
        }
    }
}

/// Published session state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    /// Generation of the latest request
    pub generation: u64,
    pub metric: Option<MetricSet>,
    pub range: Option<DateRange>,
    pub state: QueryState,
}

/// Query session for one analytics view
pub struct AnalyticsSession {
    pipeline: QueryPipeline,
    state_tx: Arc<watch::Sender<SessionState>>,
    in_flight: Option<JoinHandle<()>>,
}

impl AnalyticsSession {
    pub fn new(pipeline: QueryPipeline) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        Self {
            pipeline,
            state_tx: Arc::new(state_tx),
            in_flight: None,
        }
    }

    /// Start a query, superseding any request still in flight.
    ///
    /// Returns the request's generation. Must be called from within a Tokio
    /// runtime.
    pub fn request(&mut self, metric: MetricSet, range: Option<DateRange>) -> u64 {
        let mut generation = 0;
        self.state_tx.send_modify(|s| {
            s.generation += 1;
            s.metric = Some(metric);
            s.range = range;
            s.state = QueryState::Loading;
            generation = s.generation;
        });

        if let Some(previous) = self.in_flight.take() {
            previous.abort();
        }

        debug!(metric = %metric, generation, "Analytics request");
        let pipeline = self.pipeline.clone();
        let state_tx = self.state_tx.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let outcome = pipeline.fetch(metric, range).await;
            apply_outcome(&state_tx, generation, outcome);
        }));

        generation
    }

    /// Abort the request in flight, if any, and return to idle
    pub fn cancel(&mut self) {
        if let Some(previous) = self.in_flight.take() {
            previous.abort();
        }
        self.state_tx.send_modify(|s| {
            s.generation += 1;
            s.state = QueryState::Idle;
        });
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Wait until the latest request has finished
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.state_tx.subscribe();
        let settled = match rx.wait_for(|s| !s.state.is_loading()).await {
            Ok(state) => state.clone(),
            // The sender lives in self, so this only happens during teardown
            Err(_) => self.state(),
        };
        settled
    }
}

impl Drop for AnalyticsSession {
    fn drop(&mut self) {
        if let Some(previous) = self.in_flight.take() {
            previous.abort();
        }
    }
}

/// Publish `outcome` if `generation` is still the latest request.
///
/// Returns whether it was applied.
pub(crate) fn apply_outcome(
    state_tx: &watch::Sender<SessionState>,
    generation: u64,
    outcome: QueryOutcome<QueryResult>,
) -> bool {
    state_tx.send_if_modified(|s| {
        if s.generation != generation {
            debug!(generation, current = s.generation, "Discarding superseded result");
            return false;
        }
        s.state = outcome.into();
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_generation_is_discarded() {
        let (tx, _rx) = watch::channel(SessionState {
            generation: 2,
            state: QueryState::Loading,
            ..SessionState::default()
        });

        assert!(!apply_outcome(&tx, 1, QueryOutcome::Empty));
        assert_eq!(tx.borrow().state, QueryState::Loading);

        assert!(apply_outcome(&tx, 2, QueryOutcome::Failed(QueryError::Timeout)));
        assert_eq!(tx.borrow().state, QueryState::Failed(QueryError::Timeout));
    }

    struct NoRows;

    #[async_trait::async_trait]
    impl crate::analytics::QueryService for NoRows {
        async fn query(
            &self,
            _metric: MetricSet,
            _range: Option<DateRange>,
        ) -> Result<serde_json::Value, QueryError> {
            Ok(serde_json::json!([]))
        }
    }

    #[tokio::test]
    async fn test_settled_returns_finished_state() {
        let mut session = AnalyticsSession::new(QueryPipeline::new(NoRows));
        assert_eq!(session.settled().await.state, QueryState::Idle);

        let generation = session.request(MetricSet::Power, None);
        let settled = session.settled().await;
        assert_eq!(settled.generation, generation);
        assert_eq!(settled.state, QueryState::Empty);
    }
}
