//! Handler-side access to the identity resolved by the request pipeline.

use std::ops::Deref;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use careline_core::IdentityContext;

use crate::error::AppError;

/// Identity of the authenticated caller.
///
/// The pipeline inserts it into request extensions after the credential
/// verifies. Extraction fails with 401 when the route was reached without
/// one (e.g. a `Public` route called anonymously).
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Arc<IdentityContext>);

impl Deref for CurrentIdentity {
    type Target = IdentityContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<IdentityContext>>()
            .cloned()
            .map(CurrentIdentity)
            .ok_or(AppError::Unauthenticated)
    }
}
