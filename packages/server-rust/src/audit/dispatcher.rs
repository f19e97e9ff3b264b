//! Fire-and-forget hand-off of activity records to the audit sink.

use std::sync::Arc;

use async_trait::async_trait;
use careline_core::{ActivityRecord, AuditError, AuditSink};
use tokio::sync::mpsc;
use tracing::warn;

use super::worker::{BackgroundRunnable, BackgroundWorker};

// ---------------------------------------------------------------------------
// AuditDispatcher
// ---------------------------------------------------------------------------

/// Non-blocking producer side of the audit queue.
///
/// Cloned into every request pipeline. `submit` never waits: when the queue
/// is full or the worker has stopped, the record is dropped, logged, and
/// counted.
#[derive(Debug, Clone)]
pub struct AuditDispatcher {
    tx: mpsc::Sender<ActivityRecord>,
}

impl AuditDispatcher {
    #[must_use]
    pub fn new(tx: mpsc::Sender<ActivityRecord>) -> Self {
        Self { tx }
    }

    /// Creates a dispatcher and the receiving end of its queue.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ActivityRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Enqueues a record without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::QueueFull`] or [`AuditError::QueueClosed`].
    pub fn dispatch(&self, record: ActivityRecord) -> Result<(), AuditError> {
        self.tx.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AuditError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => AuditError::QueueClosed,
        })
    }

    /// Enqueues a record and absorbs any failure.
    pub fn submit(&self, record: ActivityRecord) {
        let action = record.action().to_string();
        if let Err(error) = self.dispatch(record) {
            metrics::counter!("careline_audit_dropped_total").increment(1);
            warn!(action = %action, error = %error, "activity record dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// AuditRunnable
// ---------------------------------------------------------------------------

/// Consumer side: appends each queued record to the sink.
pub struct AuditRunnable {
    sink: Arc<dyn AuditSink>,
}

impl AuditRunnable {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl BackgroundRunnable for AuditRunnable {
    type Task = ActivityRecord;

    async fn run(&mut self, record: ActivityRecord) {
        let action = record.action().to_string();
        if let Err(error) = self.sink.append(record).await {
            metrics::counter!("careline_audit_sink_errors_total").increment(1);
            warn!(action = %action, error = %error, "audit sink append failed");
        }
    }

    async fn shutdown(&mut self) {
        tracing::debug!("audit worker drained");
    }
}

/// Starts the audit worker for `sink` and returns the dispatcher feeding it.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn spawn_audit_worker(
    sink: Arc<dyn AuditSink>,
    capacity: usize,
) -> (AuditDispatcher, BackgroundWorker<AuditRunnable>) {
    let (dispatcher, rx) = AuditDispatcher::channel(capacity);
    let worker = BackgroundWorker::start(AuditRunnable::new(sink), rx);
    (dispatcher, worker)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
