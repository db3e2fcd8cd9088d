//! Historical query service client

use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, error};

use super::{request_body, DateRange, MetricSet, QueryError};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Backend that answers analytics queries with raw JSON
#[async_trait]
pub trait QueryService: Send + Sync + 'static {
    /// Run one query. `None` asks for the service's default window.
    async fn query(
        &self,
        metric: MetricSet,
        range: Option<DateRange>,
    ) -> Result<serde_json::Value, QueryError>;
}

/// HTTP/JSON query service
pub struct HttpQueryService {
    client: reqwest::Client,
    base_url: Url,
    model: String,
}

impl HttpQueryService {
    /// Create a client for `model` at `base_url` with the default timeout
    pub fn new(base_url: &str, model: &str) -> Result<Self, QueryError> {
        Self::with_timeout(base_url, model, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, model: &str, timeout: Duration) -> Result<Self, QueryError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| QueryError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(QueryError::InvalidUrl(base_url.to_string()));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("evdash/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Full URL for a metric endpoint
    pub fn endpoint(&self, metric: MetricSet) -> Result<Url, QueryError> {
        let path = metric.endpoint_path(&self.model);
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| QueryError::InvalidUrl(e.to_string()))
    }
}

#[async_trait]
impl QueryService for HttpQueryService {
    async fn query(
        &self,
        metric: MetricSet,
        range: Option<DateRange>,
    ) -> Result<serde_json::Value, QueryError> {
        let url = self.endpoint(metric)?;
        let body = request_body(range.as_ref());
        debug!(url = %url, body = %body, "Analytics query");

        let response = self.client.post(url.clone()).json(&body).send().await?;

        if !response.status().is_success() {
            error!(url = %url, status = %response.status(), "Analytics service error");
            return Err(QueryError::Status(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let service = HttpQueryService::new("http://localhost:3000", "ve4").unwrap();
        assert_eq!(
            service.endpoint(MetricSet::Power).unwrap().as_str(),
            "http://localhost:3000/api/data/ve4/analytics/power"
        );

        let prefixed = HttpQueryService::new("https://example.com/dash", "in40").unwrap();
        assert_eq!(
            prefixed.endpoint(MetricSet::ModeDistribution).unwrap().as_str(),
            "https://example.com/dash/api/data/in40/analytics/mode-distribution"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpQueryService::new("localhost", "ve4"),
            Err(QueryError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpQueryService::new("mailto:someone@example.com", "ve4"),
            Err(QueryError::InvalidUrl(_))
        ));
    }
}
