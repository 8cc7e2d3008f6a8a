//! API Key model for request signing.
//!
//! Each key is a public identifier plus a shared secret. Clients sign every
//! request with the secret; the server looks the key up by identifier and
//! recomputes the signature.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scope that satisfies every capability check.
pub const WILDCARD_SCOPE: &str = "*";

/// Scope granted when a key is issued without any.
pub const DEFAULT_SCOPE: &str = "content:read";

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Internal row identifier (UUID)
/// - `key_id`: Public identifier sent in the `X-TDP-Key-Id` header
/// - `name`: Human-readable label
/// - `secret`: Shared HMAC secret
/// - `scopes`: Capabilities granted to the key
/// - `revoked_at`: Set when the key is revoked, cleared by rotation
/// - `last_used_at`: Refreshed after each successful authentication
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    /// Public identifier, e.g. `k_1a2b3c4d5e6f`
    pub key_id: String,

    pub name: String,

    /// Shared secret used as the HMAC key
    ///
    /// Never serialized into API responses except once at issuance or rotation.
    pub secret: String,

    pub scopes: Vec<String>,

    /// Revocation timestamp
    ///
    /// A non-null value rejects every later authentication. Keys are never
    /// hard-deleted, so the row survives for audit.
    pub revoked_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Values needed to insert a freshly issued key.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub key_id: String,
    pub name: String,
    pub secret: String,
    pub scopes: Vec<String>,
}

/// Request to issue a new API key.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "publisher",
///   "scopes": ["content:write", "content:read"]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct CreateKeyRequest {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Key metadata returned by list operations. The secret is never included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySummary {
    pub id: Uuid,
    pub key_id: String,
    pub name: String,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeySummary {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            key_id: key.key_id,
            name: key.name,
            scopes: key.scopes,
            created_at: key.created_at,
            revoked_at: key.revoked_at,
            last_used_at: key.last_used_at,
        }
    }
}

/// Response for issuance: the only time the secret leaves the server.
#[derive(Debug, Serialize)]
pub struct IssuedKeyResponse {
    pub item: ApiKeySummary,
    pub secret: String,
}

/// Response for rotation: the replacement secret.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotatedKeyResponse {
    pub key_id: String,
    pub secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedKeyResponse {
    pub ok: bool,
    pub key_id: String,
}

/// Response for listing keys.
#[derive(Debug, Serialize)]
pub struct ApiKeyList {
    pub items: Vec<ApiKeySummary>,
}
