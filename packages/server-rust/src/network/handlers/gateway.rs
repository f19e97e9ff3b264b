//! Gateway routes forwarding to the downstream data service.
//!
//! Every route here is registered through [`ProtectedRoutes`], so it is
//! authorized and audited before the handler runs. Handlers stay thin: they
//! relay the call (with the caller's credential) and hand back the
//! downstream status, content type, and body unchanged.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use careline_core::{Access, IdentityContext, RoleRequirementError};

use super::AppState;
use crate::auth::CurrentIdentity;
use crate::error::AppError;
use crate::pipeline::{PipelineContext, ProtectedRoutes};

/// Roles allowed to read and write clinical data.
pub const CLINICAL_ROLES: [&str; 4] = ["Doctor", "Nurse", "Admin", "SysAdmin"];

/// Roles allowed to manage staff records.
pub const ADMIN_ROLES: [&str; 2] = ["Admin", "SysAdmin"];

/// Builds the gateway router, binding each route to its access policy.
///
/// # Errors
///
/// Returns an error if a role list is malformed.
pub fn gateway_routes(ctx: PipelineContext) -> Result<Router<AppState>, RoleRequirementError> {
    let clinical = Access::roles(CLINICAL_ROLES)?;
    let admin = Access::roles(ADMIN_ROLES)?;

    let routes = ProtectedRoutes::new(ctx)
        .route("/api/auth/login", post(login_handler), Access::Public)
        .route("/api/employees/me", get(my_profile_handler), Access::Authenticated)
        .route(
            "/api/employees/dashboard-stats",
            get(my_dashboard_stats_handler),
            Access::Authenticated,
        )
        .route("/api/doctors/me", get(my_doctor_profile_handler), Access::Authenticated)
        .route(
            "/api/doctors/dashboard-stats",
            get(my_doctor_stats_handler),
            Access::Authenticated,
        )
        .route("/api/patients/search", get(forward_handler), clinical.clone())
        .route("/api/patients/{id}", get(forward_handler), clinical.clone())
        .route("/api/events/options", get(forward_handler), clinical.clone())
        .route("/api/events", post(forward_handler), clinical)
        .route(
            "/api/settings/quick-preview",
            get(forward_handler).put(forward_handler),
            Access::Authenticated,
        )
        .route("/api/admin/employees", get(forward_handler), admin.clone())
        .route(
            "/api/admin/employees/{id}",
            get(forward_handler).put(forward_handler),
            admin.clone(),
        )
        .route(
            "/api/admin/employees/{id}/deactivate",
            patch(forward_handler),
            admin.clone(),
        )
        .route("/api/admin/roles", get(forward_handler), admin);

    Ok(routes.into_router())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /api/auth/login`: relays the login body to the data service.
///
/// The route is public and sends no credential, even when the caller
/// presented one.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let request = state.relay.request_as(None, Method::POST, "/api/auth/login");
    let response = with_body(request, &headers, body).send().await?;
    relay_response(response).await
}

/// `GET /api/employees/me`: the caller's own employee record.
pub async fn my_profile_handler(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Response, AppError> {
    fetch_for_caller(&state, &identity, "/api/employees").await
}

/// `GET /api/employees/dashboard-stats`: dashboard counters for the caller.
pub async fn my_dashboard_stats_handler(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Response, AppError> {
    fetch_for_caller(&state, &identity, "/api/employees/dashboard-stats").await
}

/// `GET /api/doctors/me`
pub async fn my_doctor_profile_handler(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Response, AppError> {
    fetch_for_caller(&state, &identity, "/api/doctors").await
}

/// `GET /api/doctors/dashboard-stats`
pub async fn my_doctor_stats_handler(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Response, AppError> {
    fetch_for_caller(&state, &identity, "/api/doctors/dashboard-stats").await
}

/// `GET {prefix}/{sub}` on behalf of the verified caller.
async fn fetch_for_caller(
    state: &AppState,
    identity: &IdentityContext,
    prefix: &str,
) -> Result<Response, AppError> {
    let path = format!("{prefix}/{}", identity.subject());
    let response = state
        .relay
        .request_as(Some(identity), Method::GET, &path)
        .send()
        .await?;
    relay_response(response).await
}

/// Forwards the request to the same path and query downstream.
///
/// The credential comes from the ambient request scope.
pub async fn forward_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let path_and_query = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());

    let request = state.relay.request(method, path_and_query);
    let response = with_body(request, &headers, body).send().await?;
    relay_response(response).await
}

/// Copies the inbound content type and a non-empty body onto the call.
fn with_body(
    mut request: reqwest::RequestBuilder,
    headers: &HeaderMap,
    body: Bytes,
) -> reqwest::RequestBuilder {
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        request = request.header(header::CONTENT_TYPE, content_type.clone());
    }
    if !body.is_empty() {
        request = request.body(body);
    }
    request
}

/// Converts a downstream response into ours: status, content type, body.
async fn relay_response(response: reqwest::Response) -> Result<Response, AppError> {
    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let body = response.bytes().await?;

    let mut relayed = (status, body).into_response();
    match content_type {
        Some(value) => {
            relayed.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        None => {
            relayed.headers_mut().remove(header::CONTENT_TYPE);
        }
    }
    Ok(relayed)
}
