//! Careline core: identity context, role gate, activity records, and the audit sink contract.

pub mod activity;
pub mod context;
pub mod error;
pub mod role;
pub mod traits;

pub use activity::{build_activity_record, normalize_action, ActivityRecord, Arrival, UNKNOWN_ORIGIN};
pub use context::{Claims, IdentityContext};
pub use error::{AuditError, RoleRequirementError};
pub use role::{authorize, Access, Decision, DenyReason, RoleRequirement};
pub use traits::AuditSink;
