//! Server-level configuration: token verification, downstream service, audit.

use std::fmt;
use std::time::Duration;

use crate::network::NetworkConfig;

/// Logical service name stamped on every activity record.
pub const DEFAULT_SERVICE_NAME: &str = "HealthcareAPI";

/// Top-level configuration for the gateway server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name recorded as the producing service in activity records.
    pub service_name: String,
    pub network: NetworkConfig,
    pub auth: AuthConfig,
    pub downstream: DownstreamConfig,
    pub audit: AuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            network: NetworkConfig::default(),
            auth: AuthConfig::default(),
            downstream: DownstreamConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// Bearer token verification settings (HS256 JWT).
///
/// Custom `Debug` redacts the signing secret.
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared HMAC secret used to verify token signatures.
    pub secret: String,
    /// Required `iss` claim.
    pub issuer: String,
    /// Required `aud` claim.
    pub audience: String,
    /// Clock skew tolerated when checking `exp`, in seconds.
    pub leeway_secs: u64,
}

impl AuthConfig {
    /// Development-only secret used when none is configured.
    pub const DEV_SECRET: &'static str = "test-secret-key-for-jwt-testing-minimum-256-bits-long";

    #[must_use]
    pub fn uses_dev_secret(&self) -> bool {
        self.secret == Self::DEV_SECRET
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: Self::DEV_SECRET.to_string(),
            issuer: "test-issuer".to_string(),
            audience: "test-audience".to_string(),
            leeway_secs: 60,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

/// Downstream data service reached through the credential relay client.
#[derive(Debug, Clone)]
pub struct DownstreamConfig {
    /// Base URL, e.g. `http://database-api:5001`.
    pub base_url: String,
    /// Per-call timeout for outbound requests.
    pub timeout: Duration,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://database-api:5001".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Where activity records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AuditSinkKind {
    /// POST to the downstream activity-log endpoint.
    Http,
    /// Emit as structured log events.
    Tracing,
}

/// Audit queue and sink settings.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Bounded queue capacity between request pipelines and the sink worker.
    pub channel_capacity: usize,
    pub sink: AuditSinkKind,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            sink: AuditSinkKind::Http,
        }
    }
}
