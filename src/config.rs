//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;
use std::time::Duration;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DB_MAX_CONNECTIONS` (optional): connection pool size, defaults to 5
/// - `TIMESTAMP_SKEW_SECS` (optional): accepted client clock skew, defaults to 300
/// - `NONCE_TTL_SECS` (optional): how long a used nonce stays blocked, defaults to 600
/// - `NONCE_SWEEP_INTERVAL_SECS` (optional): background nonce sweep period, 0 disables (default)
/// - `MAX_BODY_BYTES` (optional): largest request body buffered, defaults to 10 MiB
/// - `STORE_TIMEOUT_MS` (optional): deadline for every store call, defaults to 5000
/// - `IDEMPOTENCY_RETENTION_HOURS` (optional): purge completed idempotency records
///   older than this, 0 keeps them forever (default)
/// - `IDEMPOTENCY_STALE_SECS` (optional): release `in_progress` idempotency claims
///   older than this so retries can run again, 0 never releases (default)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_timestamp_skew_secs")]
    pub timestamp_skew_secs: u64,

    #[serde(default = "default_nonce_ttl_secs")]
    pub nonce_ttl_secs: u64,

    #[serde(default)]
    pub nonce_sweep_interval_secs: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    #[serde(default)]
    pub idempotency_retention_hours: u64,

    #[serde(default)]
    pub idempotency_stale_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_db_max_connections() -> u32 {
    5
}

fn default_timestamp_skew_secs() -> u64 {
    300
}

fn default_nonce_ttl_secs() -> u64 {
    600
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: nonce_ttl_secs -> NONCE_TTL_SECS
        envy::from_env::<Config>()
    }

    /// Settings threaded into the authenticator, nonce ledger and coordinator.
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            max_skew: Duration::from_secs(self.timestamp_skew_secs),
            nonce_ttl: Duration::from_secs(self.nonce_ttl_secs),
            max_body_bytes: self.max_body_bytes,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }

    /// Period of the background nonce sweeper, `None` when disabled.
    pub fn nonce_sweep_interval(&self) -> Option<Duration> {
        (self.nonce_sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.nonce_sweep_interval_secs))
    }

    /// Retention window for completed idempotency records, `None` keeps them forever.
    pub fn idempotency_retention(&self) -> Option<Duration> {
        (self.idempotency_retention_hours > 0)
            .then(|| Duration::from_secs(self.idempotency_retention_hours * 3600))
    }

    /// Age after which an unfinished idempotency claim is released, `None` never.
    pub fn idempotency_stale_after(&self) -> Option<Duration> {
        (self.idempotency_stale_secs > 0).then(|| Duration::from_secs(self.idempotency_stale_secs))
    }
}

/// Windows and limits governing the signed-request protocol.
///
/// Passed explicitly to every component that needs them; nothing reads these
/// from the environment after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSettings {
    /// Maximum distance between the client timestamp and server time, in either direction.
    pub max_skew: Duration,

    /// Lifetime of a nonce ledger entry.
    pub nonce_ttl: Duration,

    /// Upper bound on buffered request bodies.
    pub max_body_bytes: usize,

    /// Deadline applied to each store call.
    pub store_timeout: Duration,
}

impl AuthSettings {
    /// A timestamp stays acceptable for `2 * max_skew`; a nonce must stay in
    /// the ledger at least that long or it can be swept while still replayable.
    pub fn nonce_ttl_covers_skew(&self) -> bool {
        self.nonce_ttl >= self.max_skew * 2
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            max_skew: Duration::from_secs(default_timestamp_skew_secs()),
            nonce_ttl: Duration::from_secs(default_nonce_ttl_secs()),
            max_body_bytes: default_max_body_bytes(),
            store_timeout: Duration::from_millis(default_store_timeout_ms()),
        }
    }
}
