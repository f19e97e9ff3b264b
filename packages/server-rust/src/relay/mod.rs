//! Credential relay for outbound service-to-service calls.
//!
//! The request pipeline scopes the caller's [`IdentityContext`] around the
//! handler future as a tokio task-local. The scope travels with that future
//! and everything it awaits, and with nothing else: concurrent requests run
//! in separate scopes, and code running outside any request (background
//! workers) sees no identity at all. Tasks spawned from a handler must use
//! [`spawn_in_request_scope`] to carry the identity along.

pub mod client;

use std::future::Future;
use std::sync::Arc;

use careline_core::IdentityContext;
use tokio::task::JoinHandle;

pub use client::{relay_header, RelayClient};

tokio::task_local! {
    static REQUEST_IDENTITY: Option<Arc<IdentityContext>>;
}

/// Failure to resolve the ambient identity. Never fatal: callers fall back
/// to sending no credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("no request scope is active on this task")]
    ContextMissing,
}

/// Runs `fut` with `identity` as the ambient request identity.
pub async fn with_request_identity<F>(identity: Option<Arc<IdentityContext>>, fut: F) -> F::Output
where
    F: Future,
{
    REQUEST_IDENTITY.scope(identity, fut).await
}

/// Returns the identity of the request currently executing on this task.
///
/// `Ok(None)` means a request scope exists but the caller is anonymous.
///
/// # Errors
///
/// Returns [`RelayError::ContextMissing`] outside any request scope.
pub fn current_identity() -> Result<Option<Arc<IdentityContext>>, RelayError> {
    REQUEST_IDENTITY
        .try_with(Clone::clone)
        .map_err(|_| RelayError::ContextMissing)
}

/// Spawns `fut` on the runtime, carrying the current request identity (if
/// any) into the new task.
pub fn spawn_in_request_scope<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let identity = current_identity().ok().flatten();
    tokio::spawn(REQUEST_IDENTITY.scope(identity, fut))
}

#[cfg(test)]
mod tests {
    use careline_core::Claims;

    use super::*;

    fn identity(token: &str) -> Arc<IdentityContext> {
        Arc::new(IdentityContext::new(
            token,
            Claims {
                sub: "1".to_string(),
                exp: 0,
                roles: vec![],
            },
        ))
    }

    #[tokio::test]
    async fn outside_scope_reports_context_missing() {
        assert_eq!(current_identity().unwrap_err(), RelayError::ContextMissing);
    }

    #[tokio::test]
    async fn scope_exposes_identity_to_nested_awaits() {
        async fn nested() -> Option<String> {
            tokio::task::yield_now().await;
            current_identity()
                .unwrap()
                .map(|id| id.token().to_string())
        }

        let seen = with_request_identity(Some(identity("abc123")), async { nested().await }).await;
        assert_eq!(seen.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn anonymous_scope_is_not_missing() {
        let seen = with_request_identity(None, async { current_identity() }).await;
        assert_eq!(seen.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_scopes_do_not_leak() {
        let a = tokio::spawn(with_request_identity(Some(identity("token-a")), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            current_identity().unwrap().unwrap().token().to_string()
        }));
        let b = tokio::spawn(with_request_identity(Some(identity("token-b")), async {
            tokio::task::yield_now().await;
            current_identity().unwrap().unwrap().token().to_string()
        }));
        assert_eq!(a.await.unwrap(), "token-a");
        assert_eq!(b.await.unwrap(), "token-b");
    }

    #[tokio::test]
    async fn plain_spawn_does_not_inherit_scope() {
        let result = with_request_identity(Some(identity("abc123")), async {
            tokio::spawn(async { current_identity() }).await.unwrap()
        })
        .await;
        assert_eq!(result.unwrap_err(), RelayError::ContextMissing);
    }

    #[tokio::test]
    async fn spawn_in_request_scope_inherits_identity() {
        let token = with_request_identity(Some(identity("abc123")), async {
            spawn_in_request_scope(async {
                current_identity().unwrap().map(|id| id.token().to_string())
            })
            .await
            .unwrap()
        })
        .await;
        assert_eq!(token.as_deref(), Some("abc123"));
    }
}
