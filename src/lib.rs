//! Content API server library.
//!
//! Signed-request authentication with replay protection, idempotent writes
//! and keyset-paginated public search over posts, moments and gallery items.
//!
//! The binary in `main.rs` wires [`store::postgres::PgStore`] into
//! [`routes::build_router`]; integration tests do the same with
//! [`store::memory::MemoryStore`].

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
