//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Tag requests with a correlation id
//! - Authenticate signed requests
//! - Enforce per-route scopes
//! - Short-circuit requests (reject unauthorized)

/// Signed-request authentication and scope checks
pub mod auth;
/// `X-Request-Id` propagation
pub mod request_id;
