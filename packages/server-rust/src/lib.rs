//! Careline server: authenticated request pipeline in front of the data
//! service.
//!
//! Each protected route runs behind the [`pipeline`]: the caller's bearer
//! token is verified, the route's access policy is enforced, the handler runs
//! with the caller's identity in scope so [`relay`] can forward it
//! downstream, and one activity record per request is handed to the
//! [`audit`] worker without delaying the response.

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod relay;

pub use config::{AuditConfig, AuditSinkKind, AuthConfig, DownstreamConfig, ServerConfig};
pub use error::AppError;
pub use network::{NetworkConfig, NetworkModule};
pub use pipeline::{PipelineContext, ProtectedRoutes};
pub use relay::RelayClient;
