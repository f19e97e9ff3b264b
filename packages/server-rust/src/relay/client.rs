//! Outbound HTTP client that relays the caller's bearer credential.

use axum::http::{header, HeaderMap, HeaderValue, Method};
use careline_core::IdentityContext;
use tracing::{debug, warn};

use super::current_identity;
use crate::config::DownstreamConfig;

/// Builds the `Authorization` value relayed for `identity`.
///
/// The token is forwarded verbatim as `Bearer <token>`; it is not re-signed
/// or re-validated. Returns `None` when there is no identity, or when the
/// token cannot be carried in a header (logged, never fatal).
#[must_use]
pub fn relay_header(identity: Option<&IdentityContext>) -> Option<HeaderValue> {
    let identity = identity?;
    match HeaderValue::from_str(&format!("Bearer {}", identity.token())) {
        Ok(mut value) => {
            value.set_sensitive(true);
            Some(value)
        }
        Err(_) => {
            warn!("caller credential is not a valid header value, not relayed");
            None
        }
    }
}

/// Client for the downstream data service.
///
/// Every request it builds is decorated with the caller's credential when
/// one is available; the downstream response is returned untouched.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &DownstreamConfig) -> anyhow::Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for a downstream path (which may carry a query string).
    #[must_use]
    pub fn url(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.base_url, path_and_query)
        } else {
            format!("{}/{}", self.base_url, path_and_query)
        }
    }

    /// Starts a request on behalf of the request currently executing on
    /// this task.
    ///
    /// Outside any request scope the call proceeds without a credential.
    #[must_use]
    pub fn request(&self, method: Method, path_and_query: &str) -> reqwest::RequestBuilder {
        let identity = match current_identity() {
            Ok(identity) => identity,
            Err(error) => {
                debug!(error = %error, "no request scope, outbound call carries no credential");
                None
            }
        };
        self.request_as(identity.as_deref(), method, path_and_query)
    }

    /// Starts a request on behalf of an explicitly supplied identity.
    #[must_use]
    pub fn request_as(
        &self,
        identity: Option<&IdentityContext>,
        method: Method,
        path_and_query: &str,
    ) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path_and_query));
        match relay_header(identity) {
            Some(value) => {
                metrics::counter!("careline_relay_calls_total", "credential" => "relayed")
                    .increment(1);
                builder.header(header::AUTHORIZATION, value)
            }
            None => {
                metrics::counter!("careline_relay_calls_total", "credential" => "none")
                    .increment(1);
                builder
            }
        }
    }
}
