//! Network module with deferred startup lifecycle.
//!
//! `new()` wires the request pipeline and starts the audit worker,
//! `start()` binds the TCP listener, and `serve()` accepts connections until
//! the shutdown future resolves.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use careline_core::AuditSink;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::handlers::{
    gateway_routes, health_handler, liveness_handler, readiness_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::{track_in_flight, DrainGate, ShutdownController};
use crate::audit::{spawn_audit_worker, AuditRunnable, BackgroundWorker};
use crate::auth::TokenVerifier;
use crate::config::ServerConfig;
use crate::pipeline::PipelineContext;
use crate::relay::RelayClient;

/// Manages the full HTTP server lifecycle.
///
/// 1. `new()` -- builds the relay client, token verifier, audit worker, and
///    gateway routes
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled, drains
///    in-flight requests, then flushes the audit queue
pub struct NetworkModule {
    config: ServerConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
    relay: RelayClient,
    gateway: Router<AppState>,
    pipeline: PipelineContext,
    audit_worker: BackgroundWorker<AuditRunnable>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    ///
    /// Must be called inside a tokio runtime: the audit worker is spawned
    /// here so records can be accepted as soon as routes exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the downstream client cannot be built or a route
    /// policy is malformed.
    pub fn new(config: ServerConfig, sink: Arc<dyn AuditSink>) -> anyhow::Result<Self> {
        let relay = RelayClient::new(&config.downstream)?;
        let (audit, audit_worker) = spawn_audit_worker(sink, config.audit.channel_capacity);
        let ctx = PipelineContext::new(
            &config.service_name,
            TokenVerifier::new(&config.auth),
            audit,
        );
        let gateway = gateway_routes(ctx.clone())?;

        Ok(Self {
            config,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
            relay,
            gateway,
            pipeline: ctx,
            audit_worker,
        })
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health`, `/health/live`, `/health/ready` -- health checks, outside
    ///   the pipeline
    /// - `/api/...` -- gateway routes, each behind the request pipeline and
    ///   counted as in flight
    pub fn build_router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            shutdown: Arc::clone(&self.shutdown),
            service_name: Arc::from(self.config.service_name.as_str()),
            start_time: Instant::now(),
        };

        let gateway = self
            .gateway
            .clone()
            .layer(axum::middleware::from_fn_with_state(
                DrainGate {
                    controller: Arc::clone(&self.shutdown),
                    pipeline: self.pipeline.clone(),
                },
                track_in_flight,
            ));

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .merge(gateway)
            .layer(build_http_layers(&self.config.network))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured one
    /// when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let network = &self.config.network;
        let addr = format!("{}:{}", network.host, network.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", network.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves.
    ///
    /// After the signal:
    /// 1. Health state transitions to Draining (readiness fails, new
    ///    gateway requests get 503)
    /// 2. Waits up to the drain timeout for in-flight requests
    /// 3. Stops the audit worker once every queued record is delivered
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error or TLS
    /// material cannot be loaded.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");
        let router = self.build_router();
        let shutdown_ctrl = Arc::clone(&self.shutdown);

        let signal_ctrl = Arc::clone(&shutdown_ctrl);
        let signal = async move {
            shutdown.await;
            info!("Shutdown signal received, draining");
            signal_ctrl.trigger_shutdown();
        };

        shutdown_ctrl.set_ready();

        let served = if let Some(ref tls_config) = self.config.network.tls {
            serve_tls(listener, router, tls_config, signal).await
        } else {
            serve_plain(listener, router, signal).await
        };

        drain_requests(&shutdown_ctrl, self.config.network.drain_timeout).await;
        self.audit_worker.stop().await;
        info!("Audit queue flushed");

        served
    }
}

/// Serves plain HTTP using axum's built-in server.
async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("Serving plain HTTP connections");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

/// Serves TLS connections using `axum-server` with rustls.
///
/// Reuses the pre-bound TCP listener by converting it to a `std::net::TcpListener`.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls_config: &super::config::TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!("Serving TLS connections on {}", addr);

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await?;
    Ok(())
}

/// Moves to Draining (if not already) and waits for in-flight requests.
async fn drain_requests(shutdown_ctrl: &ShutdownController, timeout: Duration) {
    shutdown_ctrl.trigger_shutdown();

    let in_flight = shutdown_ctrl.in_flight_count();
    if in_flight > 0 {
        info!("Waiting for {} in-flight requests", in_flight);
    }

    if shutdown_ctrl.wait_for_drain(timeout).await {
        info!("All requests drained");
    } else {
        warn!("Drain timeout expired with in-flight requests remaining");
    }
}
