//! Error types shared by the pipeline components.

/// Invalid role requirement declared at registration time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleRequirementError {
    #[error("role requirement must name at least one role")]
    Empty,
    #[error("role names must not be blank")]
    BlankRole,
}

/// Failure to hand an activity record to, or persist it in, an audit sink.
///
/// Always absorbed by the caller: it is logged and counted, never turned
/// into a response.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit queue is full, record dropped")]
    QueueFull,
    #[error("audit queue is closed, record dropped")]
    QueueClosed,
    #[error("audit sink rejected record: {0}")]
    Sink(String),
}
