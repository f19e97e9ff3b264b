//! Inbound credential handling: bearer token verification and the
//! handler-side identity extractor.

pub mod extract;
pub mod verifier;

pub use extract::CurrentIdentity;
pub use verifier::{bearer_token, AuthError, TokenVerifier};
