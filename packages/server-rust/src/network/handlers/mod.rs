//! HTTP handler definitions for the gateway server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports the handler functions used by the router.

pub mod gateway;
pub mod health;

pub use gateway::{
    forward_handler, gateway_routes, login_handler, my_dashboard_stats_handler,
    my_doctor_profile_handler, my_doctor_stats_handler, my_profile_handler,
};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::relay::RelayClient;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references and cheap handles so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Client for the downstream data service.
    pub relay: RelayClient,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Service name reported by `/health`.
    pub service_name: Arc<str>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
