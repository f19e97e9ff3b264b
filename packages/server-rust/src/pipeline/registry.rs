//! Registration surface that binds each protected route to its access policy.

use axum::routing::MethodRouter;
use axum::Router;
use careline_core::Access;

use super::layer::{PipelineContext, PipelineLayer};

/// Builds a router in which every route runs behind the request pipeline.
///
/// The access policy is supplied at registration and cannot be changed
/// afterwards; there is no way to add a route that bypasses the pipeline.
pub struct ProtectedRoutes<S = ()> {
    router: Router<S>,
    ctx: PipelineContext,
}

impl<S> ProtectedRoutes<S>
where
    S: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            router: Router::new(),
            ctx,
        }
    }

    /// Registers `method_router` at `path`, gated by `access`.
    #[must_use]
    pub fn route(mut self, path: &str, method_router: MethodRouter<S>, access: Access) -> Self {
        let layer = PipelineLayer::new(access, self.ctx.clone());
        self.router = self.router.route(path, method_router.layer(layer));
        self
    }

    #[must_use]
    pub fn into_router(self) -> Router<S> {
        self.router
    }
}
