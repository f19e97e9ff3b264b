//! Best-effort audit trail.
//!
//! - [`dispatcher`]: non-blocking producer used by the request pipeline
//! - [`worker`]: bounded-queue background worker that drains records
//! - [`sinks`]: `tracing` and HTTP activity-log sinks

pub mod dispatcher;
pub mod sinks;
pub mod worker;

pub use dispatcher::{spawn_audit_worker, AuditDispatcher, AuditRunnable};
pub use sinks::{HttpAuditSink, TracingAuditSink};
pub use worker::{BackgroundRunnable, BackgroundWorker};
