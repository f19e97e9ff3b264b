//! Request pipeline orchestrator.
//!
//! Per request: resolve identity → evaluate the route's access policy →
//! (denied: record + reject) or (allowed: run the handler inside the
//! identity's relay scope, then record) → respond. The activity record is
//! handed off without waiting, so the response never depends on the audit
//! outcome. A request whose future is dropped midway (timeout, client
//! disconnect) still yields its one record, marked `cancelled`.

use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use careline_core::{build_activity_record, Access, Arrival, Decision};
use futures_util::FutureExt;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::audit::AuditDispatcher;
use crate::auth::TokenVerifier;
use crate::error::AppError;
use crate::relay::with_request_identity;

// ---------------------------------------------------------------------------
// PipelineContext
// ---------------------------------------------------------------------------

/// Collaborators shared by every protected route.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    service_name: Arc<str>,
    verifier: Arc<TokenVerifier>,
    audit: AuditDispatcher,
}

impl PipelineContext {
    #[must_use]
    pub fn new(service_name: &str, verifier: TokenVerifier, audit: AuditDispatcher) -> Self {
        Self {
            service_name: Arc::from(service_name),
            verifier: Arc::new(verifier),
            audit,
        }
    }

    /// Records a request refused before it reached a route's pipeline
    /// (e.g. while the server drains). `outcome` is appended to the details.
    pub fn record_refusal(&self, req: &Request<Body>, outcome: &str) {
        PendingRecord::new(self, req).submit(outcome);
    }
}

// ---------------------------------------------------------------------------
// PipelineLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps a route handler with the request pipeline.
///
/// Carries the route's access policy, fixed when the route is registered.
#[derive(Debug, Clone)]
pub struct PipelineLayer {
    access: Arc<Access>,
    ctx: PipelineContext,
}

impl PipelineLayer {
    #[must_use]
    pub fn new(access: Access, ctx: PipelineContext) -> Self {
        Self {
            access: Arc::new(access),
            ctx,
        }
    }
}

impl<S> Layer<S> for PipelineLayer {
    type Service = PipelineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PipelineService {
            inner,
            access: Arc::clone(&self.access),
            ctx: self.ctx.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineService
// ---------------------------------------------------------------------------

/// Service wrapper that gates, runs, and audits one request.
#[derive(Debug, Clone)]
pub struct PipelineService<S> {
    inner: S,
    access: Arc<Access>,
    ctx: PipelineContext,
}

impl<S> Service<Request<Body>> for PipelineService<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // Received
        let record = PendingRecord::new(&self.ctx, &req);

        // Authorizing
        let identity = self.ctx.verifier.identify(req.headers()).map(Arc::new);
        let decision = self.access.evaluate(identity.as_deref());

        let span = info_span!(
            "request",
            service = %self.ctx.service_name,
            action = %record.target,
            decision = decision.as_str(),
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );
        metrics::counter!("careline_requests_total", "decision" => decision.as_str()).increment(1);

        if let Decision::Deny(reason) = decision {
            // Denied: the handler never runs.
            return Box::pin(
                async move {
                    let arrival = record.arrival;
                    record.submit(&format!("denied: {}", reason.as_str()));
                    let response = AppError::from(reason).into_response();
                    record_completion(&response, arrival);
                    tracing::info!(reason = reason.as_str(), "request denied");
                    Ok(response)
                }
                .instrument(span),
            );
        }

        // Authorized
        if let Some(identity) = &identity {
            req.extensions_mut().insert(Arc::clone(identity));
        }

        // The clone taken by `poll_ready` is the one that is ready.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                // Handling. If this future is dropped here (timeout, client
                // gone), `record` submits a `cancelled` outcome on drop.
                let handled = with_request_identity(
                    identity,
                    AssertUnwindSafe(inner.call(req)).catch_unwind(),
                )
                .await;

                let (response, outcome) = match handled {
                    Ok(Ok(response)) => {
                        let outcome = format!("status {}", response.status().as_u16());
                        (response, outcome)
                    }
                    Ok(Err(never)) => match never {},
                    Err(_panic) => {
                        tracing::error!("handler panicked");
                        let response =
                            AppError::Internal("handler panicked".to_string()).into_response();
                        (response, "handler panicked".to_string())
                    }
                };

                // LogDispatched
                let arrival = record.arrival;
                record.submit(&outcome);

                // Responded
                record_completion(&response, arrival);
                Ok(response)
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// PendingRecord
// ---------------------------------------------------------------------------

/// Outcome recorded when the request future is dropped before it finishes.
pub const CANCELLED_OUTCOME: &str = "cancelled";

/// Activity record owed for one request.
///
/// Submitted exactly once: explicitly with the request's outcome, or on drop
/// with [`CANCELLED_OUTCOME`] when the pipeline future is abandoned midway.
struct PendingRecord {
    audit: AuditDispatcher,
    service_name: Arc<str>,
    target: String,
    origin: Option<IpAddr>,
    arrival: Arrival,
    submitted: bool,
}

impl PendingRecord {
    fn new(ctx: &PipelineContext, req: &Request<Body>) -> Self {
        Self {
            audit: ctx.audit.clone(),
            service_name: Arc::clone(&ctx.service_name),
            target: req.uri().path().to_string(),
            origin: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip()),
            arrival: Arrival::now(),
            submitted: false,
        }
    }

    fn submit(mut self, outcome: &str) {
        self.dispatch(outcome);
    }

    fn dispatch(&mut self, outcome: &str) {
        if std::mem::replace(&mut self.submitted, true) {
            return;
        }
        self.audit.submit(build_activity_record(
            &self.service_name,
            &self.target,
            self.origin,
            self.arrival,
            Some(outcome),
        ));
    }
}

impl Drop for PendingRecord {
    fn drop(&mut self) {
        if !self.submitted {
            tracing::info!(action = %self.target, "request abandoned before completion");
            self.dispatch(CANCELLED_OUTCOME);
        }
    }
}

fn record_completion(response: &Response, arrival: Arrival) {
    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = arrival.monotonic().elapsed().as_millis() as u64;
    let span = tracing::Span::current();
    span.record("status", response.status().as_u16());
    span.record("duration_ms", duration_ms);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
