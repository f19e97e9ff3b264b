//! Server lifecycle state and in-flight request tracking.
//!
//! Health checks read the lifecycle state; the in-flight middleware counts
//! gateway requests with RAII guards so shutdown can wait for them to drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::pipeline::PipelineContext;

/// Server health state.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Server is initializing (not yet accepting requests).
    Starting,
    /// Server is fully operational and accepting requests.
    Ready,
    /// Server is draining in-flight requests (no new requests accepted).
    Draining,
    /// Server has fully stopped (all in-flight requests completed).
    Stopped,
}

impl HealthState {
    /// Status label reported by `/health`. A ready server reports `Healthy`.
    #[must_use]
    pub fn status_label(self) -> &'static str {
        match self {
            Self::Ready => "Healthy",
            Self::Starting => "Starting",
            Self::Draining => "Draining",
            Self::Stopped => "Stopped",
        }
    }
}

/// Coordinates graceful shutdown with health state and in-flight tracking.
///
/// 1. Health checks check `health_state()` to report readiness
/// 2. [`track_in_flight`] refuses new gateway requests once draining
/// 3. `trigger_shutdown()` moves to Draining
/// 4. `wait_for_drain()` waits until in-flight requests complete
#[derive(Debug)]
pub struct ShutdownController {
    in_flight: Arc<AtomicU64>,
    health_state: ArcSwap<HealthState>,
}

impl ShutdownController {
    /// Creates a new shutdown controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(AtomicU64::new(0)),
            health_state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    pub fn trigger_shutdown(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        matches!(
            self.health_state(),
            HealthState::Draining | HealthState::Stopped
        )
    }

    /// Creates an RAII guard that tracks an in-flight request.
    ///
    /// The counter is decremented when the guard drops, including during
    /// unwinding.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Waits for all in-flight requests to complete, up to `timeout`.
    ///
    /// Returns `true` and moves to `Stopped` if everything drained; returns
    /// `false` (state stays `Draining`) if the timeout expired.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.in_flight.load(Ordering::Relaxed) == 0 {
                self.health_state.store(Arc::new(HealthState::Stopped));
                return true;
            }

            if tokio::time::Instant::now() >= deadline {
                return false;
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Outcome recorded for requests refused while draining.
pub const SHUTTING_DOWN_OUTCOME: &str = "denied: shutting down";

/// State for [`track_in_flight`].
#[derive(Debug, Clone)]
pub struct DrainGate {
    pub controller: Arc<ShutdownController>,
    /// Used to record requests refused while draining.
    pub pipeline: PipelineContext,
}

/// Middleware counting gateway requests in flight.
///
/// Once the server is draining, new requests are refused with 503 before
/// they reach authorization; each refusal is still recorded.
pub async fn track_in_flight(
    State(gate): State<DrainGate>,
    request: Request,
    next: Next,
) -> Response {
    if gate.controller.is_draining() {
        gate.pipeline.record_refusal(&request, SHUTTING_DOWN_OUTCOME);
        return AppError::ShuttingDown.into_response();
    }
    let _guard = gate.controller.in_flight_guard();
    next.run(request).await
}
