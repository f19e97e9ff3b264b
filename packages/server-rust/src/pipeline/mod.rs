//! Authenticated request pipeline.
//!
//! - [`layer`]: the per-request orchestrator (gate, handler, audit hand-off)
//! - [`registry`]: attaches an access policy to each route at registration

pub mod layer;
pub mod registry;

pub use layer::{PipelineContext, PipelineLayer, PipelineService};
pub use registry::ProtectedRoutes;
