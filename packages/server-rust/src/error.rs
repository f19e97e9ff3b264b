//! User-visible errors and their HTTP mapping.
//!
//! Every error leaves the server as
//! `{"error": {"code": <status>, "message": <text>}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use careline_core::DenyReason;
use serde_json::json;

/// Application-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No valid credential.
    #[error("authentication required")]
    Unauthenticated,

    /// Valid credential, insufficient role.
    #[error("insufficient role for this operation")]
    Forbidden,

    /// The downstream service could not be reached.
    #[error("downstream service unavailable: {0}")]
    Downstream(String),

    /// The server is draining and accepts no new work.
    #[error("server is shutting down")]
    ShuttingDown,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Downstream(_) => StatusCode::BAD_GATEWAY,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DenyReason> for AppError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::Unauthenticated => Self::Unauthenticated,
            DenyReason::Forbidden => Self::Forbidden,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        tracing::warn!(error = %error, "downstream call failed");
        Self::Downstream(error.without_url().to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
