//! PostgreSQL store backed by a sqlx connection pool.
//!
//! # Atomicity
//!
//! Nonce registration and idempotency ownership use
//! `INSERT ... ON CONFLICT DO NOTHING`; a zero `rows_affected` means another
//! writer got there first. No explicit transactions or row locks are needed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgRow;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::api_key::{ApiKey, NewApiKey};
use crate::models::content::{NewPost, Post, normalize_locale};
use crate::models::idempotency::{IdempotencyRecord, IdempotencyStatus};
use crate::models::search::{
    GallerySearchItem, MomentSearchItem, PostSearchItem, SearchItem, SearchQuery, SearchSection,
    moment_preview, post_preview,
};
use crate::services::search_cursor::SearchCursor;
use crate::services::search_query::build_search_query;

use super::{ApiKeyStore, HealthCheck, IdempotencyStore, NonceStore, PostStore, SearchStore};

const API_KEY_COLUMNS: &str =
    "id, key_id, name, secret, scopes, revoked_at, created_at, last_used_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyStore for PgStore {
    async fn find_by_key_id(&self, key_id: &str) -> Result<Option<ApiKey>, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_id = $1"
        ))
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn touch_last_used(&self, key_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE key_id = $1")
            .bind(key_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_key(&self, new_key: NewApiKey) -> Result<ApiKey, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(&format!(
            "INSERT INTO api_keys (key_id, name, secret, scopes)
             VALUES ($1, $2, $3, $4)
             RETURNING {API_KEY_COLUMNS}"
        ))
        .bind(&new_key.key_id)
        .bind(&new_key.name)
        .bind(&new_key.secret)
        .bind(&new_key.scopes)
        .fetch_one(&self.pool)
        .await?;

        Ok(key)
    }

    async fn list_keys(&self) -> Result<Vec<ApiKey>, AppError> {
        let keys = sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn rotate_key(&self, key_id: &str, new_secret: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE api_keys
             SET secret = $2, revoked_at = NULL, updated_at = NOW()
             WHERE key_id = $1",
        )
        .bind(key_id)
        .bind(new_secret)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_key(&self, key_id: &str) -> Result<bool, AppError> {
        // Keep the first revocation time if revoked twice
        let result = sqlx::query(
            "UPDATE api_keys
             SET revoked_at = COALESCE(revoked_at, NOW()), updated_at = NOW()
             WHERE key_id = $1",
        )
        .bind(key_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl NonceStore for PgStore {
    async fn insert_if_absent(
        &self,
        key_id: &str,
        nonce: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO request_nonces (key_id, nonce, expires_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (key_id, nonce) DO NOTHING",
        )
        .bind(key_id)
        .bind(nonce)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM request_nonces WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl IdempotencyStore for PgStore {
    async fn insert_in_progress(&self, key: &str, request_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO idempotency_keys (key, request_hash, status)
             VALUES ($1, $2, $3)
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(request_hash)
        .bind(IdempotencyStatus::InProgress.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>, AppError> {
        let row = sqlx::query(
            "SELECT key, request_hash, status, response, created_at, updated_at
             FROM idempotency_keys
             WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw_status: String = row.try_get("status")?;
        let status = IdempotencyStatus::parse(&raw_status).ok_or_else(|| {
            AppError::Internal(format!("unknown idempotency status {raw_status:?}"))
        })?;
        let response: Option<sqlx::types::Json<Value>> = row.try_get("response")?;

        Ok(Some(IdempotencyRecord {
            key: row.try_get("key")?,
            request_hash: row.try_get("request_hash")?,
            status,
            response: response.map(|json| json.0),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn mark_completed(
        &self,
        key: &str,
        request_hash: &str,
        response: &Value,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE idempotency_keys
             SET status = $4, response = $3, updated_at = NOW()
             WHERE key = $1 AND request_hash = $2 AND status = $5",
        )
        .bind(key)
        .bind(request_hash)
        .bind(sqlx::types::Json(response))
        .bind(IdempotencyStatus::Completed.as_str())
        .bind(IdempotencyStatus::InProgress.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM idempotency_keys WHERE status = $2 AND updated_at < $1",
        )
        .bind(cutoff)
        .bind(IdempotencyStatus::Completed.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn release_in_progress_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM idempotency_keys WHERE status = $2 AND created_at < $1",
        )
        .bind(cutoff)
        .bind(IdempotencyStatus::InProgress.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn create_post(
        &self,
        post: NewPost,
        updated_by: Option<String>,
    ) -> Result<Post, AppError> {
        let post = sqlx::query_as::<_, Post>(
            "INSERT INTO posts
                 (locale, title, slug, excerpt, content, cover_url, tags, status, published_at, updated_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                     CASE WHEN $8 = 'published' THEN NOW() END, $9)
             RETURNING id, locale, title, slug, excerpt, content, cover_url, tags, status,
                       published_at, updated_by, created_at, updated_at",
        )
        .bind(&post.locale)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(&post.cover_url)
        .bind(&post.tags)
        .bind(&post.status)
        .bind(&updated_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(post)
    }
}

#[async_trait]
impl SearchStore for PgStore {
    async fn search(
        &self,
        query: &SearchQuery,
        cursor: Option<&SearchCursor>,
        fetch_limit: usize,
    ) -> Result<Vec<SearchItem>, AppError> {
        let mut builder = build_search_query(query, cursor, fetch_limit);
        let rows = builder.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| decode_hit(query.section, row))
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(AppError::from)
    }
}

fn decode_hit(section: SearchSection, row: &PgRow) -> Result<SearchItem, sqlx::Error> {
    let id: String = row.try_get("id")?;
    let raw_locale: String = row.try_get("locale")?;
    let locale = normalize_locale(&raw_locale).to_string();
    let sort_at: DateTime<Utc> = row.try_get("sort_at")?;

    let item = match section {
        SearchSection::Post => {
            let excerpt: Option<String> = row.try_get("excerpt")?;
            let content: String = row.try_get("content")?;
            SearchItem::Post(PostSearchItem {
                id,
                section,
                locale,
                sort_at,
                slug: row.try_get("slug")?,
                title: row.try_get("title")?,
                excerpt: post_preview(excerpt.as_deref(), &content),
                tags: row.try_get("tags")?,
            })
        }
        SearchSection::Moment => {
            let content: String = row.try_get("content")?;
            SearchItem::Moment(MomentSearchItem {
                id,
                section,
                locale,
                sort_at,
                content: moment_preview(&content),
                location_name: row.try_get("location_name")?,
            })
        }
        SearchSection::Gallery => SearchItem::Gallery(GallerySearchItem {
            id,
            section,
            locale,
            sort_at,
            title: row.try_get("title")?,
            camera: row.try_get("camera")?,
            lens: row.try_get("lens")?,
            focal_length: row.try_get("focal_length")?,
            aperture: row.try_get("aperture")?,
            iso: row.try_get("iso")?,
            thumb_url: row.try_get("thumb_url")?,
            file_url: row.try_get("file_url")?,
        }),
    };

    Ok(item)
}

#[async_trait]
impl HealthCheck for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
