//! Health, liveness, and readiness endpoint handlers.
//!
//! Registered outside the request pipeline: health checks carry no credential and
//! are never audited.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Returns detailed health information as JSON.
///
/// Always returns 200; the `status` field says whether the server is
/// actually serving (`Healthy`) or still starting or draining.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.shutdown.health_state();

    Json(json!({
        "status": health.status_label(),
        "service": &*state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "in_flight": state.shutdown.in_flight_count(),
    }))
}

/// Liveness check, always 200 OK while the process responds.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness check: 200 when ready, 503 while starting or draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::config::DownstreamConfig;
    use crate::network::ShutdownController;
    use crate::relay::RelayClient;

    fn test_state() -> AppState {
        AppState {
            relay: RelayClient::new(&DownstreamConfig::default()).unwrap(),
            shutdown: Arc::new(ShutdownController::new()),
            service_name: Arc::from("HealthcareAPI"),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn health_handler_returns_json_with_all_fields() {
        let state = test_state();
        state.shutdown.set_ready();

        let json = health_handler(State(state)).await.0;

        assert_eq!(json["status"], "Healthy");
        assert_eq!(json["service"], "HealthcareAPI");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert!(json["timestamp"].is_string());
        assert!(json["uptime_secs"].is_number());
        assert_eq!(json["in_flight"], 0);
    }

    #[tokio::test]
    async fn health_handler_reports_starting_state() {
        let json = health_handler(State(test_state())).await.0;
        assert_eq!(json["status"], "Starting");
    }

    #[tokio::test]
    async fn health_handler_reports_draining_state() {
        let state = test_state();
        state.shutdown.set_ready();
        state.shutdown.trigger_shutdown();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["status"], "Draining");
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_handler_follows_health_state() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
