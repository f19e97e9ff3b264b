//! Careline gateway server binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use careline_core::AuditSink;
use careline_server::audit::{HttpAuditSink, TracingAuditSink};
use careline_server::config::DEFAULT_SERVICE_NAME;
use careline_server::network::TlsConfig;
use careline_server::{
    AuditConfig, AuditSinkKind, AuthConfig, DownstreamConfig, NetworkConfig, NetworkModule,
    ServerConfig,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Careline authenticated gateway")]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "CARELINE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "CARELINE_PORT", default_value_t = 5000)]
    port: u16,

    /// Service name stamped on activity records.
    #[arg(long, env = "CARELINE_SERVICE_NAME", default_value = DEFAULT_SERVICE_NAME)]
    service_name: String,

    /// HMAC secret for bearer tokens. Falls back to a development secret.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    #[arg(long, env = "CARELINE_JWT_ISSUER", default_value = "test-issuer")]
    jwt_issuer: String,

    #[arg(long, env = "CARELINE_JWT_AUDIENCE", default_value = "test-audience")]
    jwt_audience: String,

    /// Base URL of the downstream data service.
    #[arg(long, env = "DATABASE_API_URL", default_value = "http://database-api:5001")]
    downstream_url: String,

    /// Downstream call timeout in seconds.
    #[arg(long, env = "CARELINE_DOWNSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    downstream_timeout_secs: u64,

    /// Activity records buffered before new ones are dropped.
    #[arg(long, env = "CARELINE_AUDIT_CAPACITY", default_value_t = 1024)]
    audit_capacity: usize,

    /// Where activity records go.
    #[arg(long, env = "CARELINE_AUDIT_SINK", value_enum, default_value_t = AuditSinkKind::Http)]
    audit_sink: AuditSinkKind,

    /// Allowed CORS origins (comma separated).
    #[arg(
        long,
        env = "CARELINE_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000"
    )]
    cors_origins: Vec<String>,

    /// Maximum request duration in seconds.
    #[arg(long, env = "CARELINE_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// PEM certificate chain; enables TLS together with `--tls-key`.
    #[arg(long, env = "CARELINE_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    #[arg(long, env = "CARELINE_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "CARELINE_METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "CARELINE_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let auth_defaults = AuthConfig::default();
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            _ => None,
        };

        ServerConfig {
            service_name: self.service_name.clone(),
            network: NetworkConfig {
                host: self.host.clone(),
                port: self.port,
                tls,
                cors_origins: self.cors_origins.clone(),
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                ..NetworkConfig::default()
            },
            auth: AuthConfig {
                secret: self
                    .jwt_secret
                    .clone()
                    .unwrap_or(auth_defaults.secret),
                issuer: self.jwt_issuer.clone(),
                audience: self.jwt_audience.clone(),
                leeway_secs: auth_defaults.leeway_secs,
            },
            downstream: DownstreamConfig {
                base_url: self.downstream_url.clone(),
                timeout: Duration::from_secs(self.downstream_timeout_secs),
            },
            audit: AuditConfig {
                channel_capacity: self.audit_capacity.max(1),
                sink: self.audit_sink,
            },
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_sink(config: &ServerConfig) -> anyhow::Result<Arc<dyn AuditSink>> {
    Ok(match config.audit.sink {
        AuditSinkKind::Http => {
            let sink = HttpAuditSink::new(&config.downstream.base_url, config.downstream.timeout)?;
            info!(endpoint = sink.endpoint(), "Activity records posted to data service");
            Arc::new(sink)
        }
        AuditSinkKind::Tracing => {
            info!("Activity records written to the log");
            Arc::new(TracingAuditSink)
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.server_config();
    if config.auth.uses_dev_secret() {
        warn!("JWT_SECRET is not set; using the development secret");
    }

    if let Some(port) = cli.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Prometheus metrics on {}", addr);
    }

    let sink = build_sink(&config)?;
    info!(
        service = %config.service_name,
        downstream = %config.downstream.base_url,
        "Starting Careline gateway"
    );

    let mut module = NetworkModule::new(config, sink)?;
    module.start().await?;
    module.serve(shutdown_signal()).await?;

    info!("Careline gateway stopped");
    Ok(())
}
