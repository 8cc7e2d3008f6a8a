//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, path params, auth context)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)

/// Liveness and readiness
pub mod health;
/// API key management
pub mod keys;
pub mod posts;
pub mod search;
