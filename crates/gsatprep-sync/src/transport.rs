//! Delivery of session summaries to a remote analytics endpoint.

use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use gsatprep_core::telemetry::SessionSummary;

use crate::error::SyncError;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Something that can deliver one summary and report whether it arrived.
#[async_trait]
pub trait SummaryTransport: Send + Sync {
    /// Human-readable transport name (e.g. "http").
    fn name(&self) -> &str;

    /// Deliver `summary`.
    async fn send(&self, summary: &SessionSummary) -> Result<(), SyncError>;
}

/// JSON-over-HTTP transport posting to `{endpoint}/sessions`.
pub struct HttpTransport {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| SyncError::Client(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SummaryTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, summary), fields(year = %summary.exam_year, session = %summary.session_id))]
    async fn send(&self, summary: &SessionSummary) -> Result<(), SyncError> {
        let mut req = self
            .client
            .post(format!("{}/sessions", self.endpoint))
            .json(summary);

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(DEFAULT_TIMEOUT_SECS)
            } else {
                SyncError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            401 | 403 => Err(SyncError::AuthenticationFailed(message)),
            _ => Err(SyncError::Rejected { status, message }),
        }
    }
}
