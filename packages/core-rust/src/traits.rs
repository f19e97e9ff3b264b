use async_trait::async_trait;

use crate::activity::ActivityRecord;
use crate::error::AuditError;

/// Durable append target for activity records.
/// Implementations: structured log, remote activity-log service, memory (tests).
///
/// Called from a background worker, never from the request path, so an
/// implementation may block on I/O for as long as its own timeouts allow.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist a single record. The record is consumed.
    async fn append(&self, record: ActivityRecord) -> Result<(), AuditError>;
}
