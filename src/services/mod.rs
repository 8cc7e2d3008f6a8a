//! Business logic services.
//!
//! Services contain the protocol logic separated from HTTP handlers. They
//! reach the store only through the repository traits in [`crate::store`].

pub mod idempotency;
pub mod key_service;
pub mod nonce_ledger;
/// Opaque keyset pagination cursors
pub mod search_cursor;
pub mod search_query;
pub mod search_service;
/// Canonical request strings and HMAC signatures
pub mod signature;
