//! Repository abstractions over the shared persistent store.
//!
//! Nonce uniqueness and idempotency ownership are never decided in process.
//! They rest on the store's atomic insert-if-absent, documented on each
//! trait method below. Two implementations exist:
//!
//! - [`postgres::PgStore`]: production, `INSERT ... ON CONFLICT DO NOTHING`
//! - [`memory::MemoryStore`]: deterministic tests, `DashMap` entry API

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::models::api_key::{ApiKey, NewApiKey};
use crate::models::content::{NewPost, Post};
use crate::models::idempotency::IdempotencyRecord;
use crate::models::search::{SearchItem, SearchQuery};
use crate::services::search_cursor::SearchCursor;

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Look up a key by its public identifier, revoked or not.
    async fn find_by_key_id(&self, key_id: &str) -> Result<Option<ApiKey>, AppError>;

    async fn touch_last_used(&self, key_id: &str) -> Result<(), AppError>;

    async fn create_key(&self, new_key: NewApiKey) -> Result<ApiKey, AppError>;

    /// All keys, newest first.
    async fn list_keys(&self) -> Result<Vec<ApiKey>, AppError>;

    /// Replace the secret and clear revocation. Returns `false` for an unknown key.
    async fn rotate_key(&self, key_id: &str, new_secret: &str) -> Result<bool, AppError>;

    /// Set the revocation timestamp. Returns `false` for an unknown key.
    async fn revoke_key(&self, key_id: &str) -> Result<bool, AppError>;
}

#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Insert `(key_id, nonce)` unless that pair already exists.
    ///
    /// # Atomicity
    ///
    /// Of any number of concurrent calls for the same pair, exactly one may
    /// return `true`. An existing row blocks the insert even if it has
    /// expired but not yet been swept.
    async fn insert_if_absent(
        &self,
        key_id: &str,
        nonce: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Remove every row whose `expires_at` is before `now`. Returns the count removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Create an `in_progress` record for `key` unless one exists.
    ///
    /// # Atomicity
    ///
    /// Of any number of concurrent calls for the same key, exactly one may
    /// return `true`; that caller owns the execution.
    async fn insert_in_progress(&self, key: &str, request_hash: &str) -> Result<bool, AppError>;

    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>, AppError>;

    /// Move an `in_progress` record with a matching hash to `completed`.
    ///
    /// Returns `false` when no such record exists, so the transition happens
    /// at most once.
    async fn mark_completed(
        &self,
        key: &str,
        request_hash: &str,
        response: &serde_json::Value,
    ) -> Result<bool, AppError>;

    /// Delete completed records last updated before `cutoff`.
    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    /// Delete `in_progress` records created before `cutoff`, freeing their
    /// keys for a new owner.
    async fn release_in_progress_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert a post. Published posts get `published_at` set to now.
    async fn create_post(&self, post: NewPost, updated_by: Option<String>)
    -> Result<Post, AppError>;
}

#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Fetch up to `fetch_limit` matching rows after `cursor`, ordered by
    /// `(sort_at DESC, id DESC)`.
    async fn search(
        &self,
        query: &SearchQuery,
        cursor: Option<&SearchCursor>,
        fetch_limit: usize,
    ) -> Result<Vec<SearchItem>, AppError>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;
}

/// Everything the application needs from a backing store.
pub trait Store:
    ApiKeyStore + NonceStore + IdempotencyStore + PostStore + SearchStore + HealthCheck
{
}

impl<T> Store for T where
    T: ApiKeyStore + NonceStore + IdempotencyStore + PostStore + SearchStore + HealthCheck
{
}

/// Run a store call under a deadline.
///
/// Expiry drops the in-flight future and yields the retryable
/// [`AppError::StoreTimeout`].
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| AppError::StoreTimeout)?
}
