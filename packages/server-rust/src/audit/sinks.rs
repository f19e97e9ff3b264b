//! Audit sink implementations.

use std::time::Duration;

use async_trait::async_trait;
use careline_core::{ActivityRecord, AuditError, AuditSink};
use tracing::info;

/// Writes each record as a structured `tracing` event on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, record: ActivityRecord) -> Result<(), AuditError> {
        info!(
            target: "audit",
            timestamp = %record.timestamp().to_rfc3339(),
            service = record.service(),
            action = record.action(),
            details = record.details(),
            "activity"
        );
        Ok(())
    }
}

/// Posts each record as JSON to the activity-log endpoint of the downstream
/// data service (`POST {base_url}/api/activitylogs`).
///
/// Runs on the audit worker, outside any request scope, so it uses its own
/// client and never carries a caller's credential.
#[derive(Debug, Clone)]
pub struct HttpAuditSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuditSink {
    /// Path of the activity-log collection on the downstream service.
    pub const PATH: &'static str = "/api/activitylogs";

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (e.g. TLS backend
    /// initialization failure).
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), Self::PATH),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn append(&self, record: ActivityRecord) -> Result<(), AuditError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&record)
            .send()
            .await
            .map_err(|e| AuditError::Sink(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AuditError::Sink(format!(
                "activity log service returned {status}"
            )))
        }
    }
}
