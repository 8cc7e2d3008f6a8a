//! Data models representing database entities and API payloads.

/// API key model used for request signing
pub mod api_key;
/// Posts, moments and gallery items
pub mod content;
pub mod idempotency;
/// Search requests, normalized queries and result items
pub mod search;
