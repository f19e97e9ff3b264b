//! Bearer token verification.
//!
//! Turns the inbound `Authorization: Bearer <token>` header into an
//! [`IdentityContext`]. Tokens are HS256 JWTs; signature, issuer, audience,
//! and expiry are all checked.

use std::fmt;

use axum::http::{header, HeaderMap};
use careline_core::{Claims, IdentityContext};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use tracing::debug;

use crate::config::AuthConfig;

/// Why a request carries no identity.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,
    #[error("authorization header is not valid ASCII")]
    InvalidHeader,
    #[error("authorization header must use the Bearer scheme")]
    NotBearer,
    #[error("bearer token is empty")]
    EmptyToken,
    #[error("invalid bearer token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Extracts the raw token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively; the token is returned verbatim
/// apart from surrounding whitespace.
///
/// # Errors
///
/// Returns an [`AuthError`] describing why no token could be read.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::NotBearer)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::NotBearer);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::EmptyToken);
    }
    Ok(token)
}

/// Verifies bearer tokens against the configured secret, issuer, and audience.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.leeway = config.leeway_secs;
        validation.validate_exp = true;

        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }

    /// Verifies `token` and builds the identity it asserts.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for a bad signature, wrong issuer
    /// or audience, expired token, or malformed claims.
    pub fn verify(&self, token: &str) -> Result<IdentityContext, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(IdentityContext::new(token, data.claims))
    }

    /// Resolves the identity of a request from its headers.
    ///
    /// Returns `None` when the credential is missing or does not verify; the
    /// reason is logged at debug level only.
    #[must_use]
    pub fn identify(&self, headers: &HeaderMap) -> Option<IdentityContext> {
        match bearer_token(headers).and_then(|token| self.verify(token)) {
            Ok(identity) => Some(identity),
            Err(AuthError::MissingHeader) => None,
            Err(reason) => {
                debug!(reason = %reason, "request credential rejected");
                None
            }
        }
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("key", &"[REDACTED]")
            .field("validation", &self.validation)
            .finish()
    }
}
