//! In-process store for tests and local development.
//!
//! Every table is a `DashMap`. Insert-if-absent goes through the entry API,
//! which holds the shard lock between the existence check and the insert,
//! so the atomicity contracts of the store traits hold here too.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::api_key::{ApiKey, NewApiKey};
use crate::models::content::{GalleryItem, Moment, NewPost, Post, normalize_locale};
use crate::models::idempotency::{IdempotencyRecord, IdempotencyStatus};
use crate::models::search::{
    GallerySearchItem, LocaleScope, MomentSearchItem, NormalizedFilters, PostSearchItem,
    SearchItem, SearchQuery, SearchSection, moment_preview, post_preview,
};
use crate::services::search_cursor::SearchCursor;

use super::{ApiKeyStore, HealthCheck, IdempotencyStore, NonceStore, PostStore, SearchStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    api_keys: DashMap<String, ApiKey>,
    nonces: DashMap<(String, String), DateTime<Utc>>,
    idempotency: DashMap<String, IdempotencyRecord>,
    posts: DashMap<Uuid, Post>,
    moments: DashMap<Uuid, Moment>,
    gallery: DashMap<Uuid, GalleryItem>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key record as-is.
    pub fn insert_api_key(&self, key: ApiKey) {
        self.api_keys.insert(key.key_id.clone(), key);
    }

    pub fn insert_post(&self, post: Post) {
        self.posts.insert(post.id, post);
    }

    /// Seed a published, public moment.
    pub fn insert_moment(
        &self,
        locale: &str,
        content: &str,
        location_name: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.moments.insert(
            id,
            Moment {
                id,
                locale: locale.to_string(),
                content: content.to_string(),
                location_name: location_name.map(str::to_string),
                status: "published".to_string(),
                visibility: "public".to_string(),
                created_at,
            },
        );
        id
    }

    pub fn insert_raw_moment(&self, moment: Moment) {
        self.moments.insert(moment.id, moment);
    }

    pub fn insert_gallery_item(&self, item: GalleryItem) {
        self.gallery.insert(item.id, item);
    }

    /// Number of nonce entries currently held, expired or not.
    pub fn nonce_count(&self) -> usize {
        self.nonces.len()
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn idempotency_record(&self, key: &str) -> Option<IdempotencyRecord> {
        self.idempotency.get(key).map(|r| r.clone())
    }

    fn post_hits(&self, query: &SearchQuery) -> Vec<SearchItem> {
        self.posts
            .iter()
            .filter(|p| p.status == "published")
            .filter(|p| locale_matches(query, &p.locale))
            .filter(|p| date_matches(&query.filters, p.sort_at()))
            .filter(|p| {
                let tags = p.tags.join(" ");
                query.filters.tags.iter().all(|tag| contains_ci(&tags, tag))
            })
            .filter(|p| {
                let document = format!(
                    "{} {} {} {}",
                    p.title,
                    p.excerpt.as_deref().unwrap_or(""),
                    p.content,
                    p.tags.join(" ")
                );
                text_matches(&document, &query.text)
            })
            .map(|p| {
                SearchItem::Post(PostSearchItem {
                    id: p.id.to_string(),
                    section: SearchSection::Post,
                    locale: normalize_locale(&p.locale).to_string(),
                    sort_at: p.sort_at(),
                    slug: p.slug.clone(),
                    title: p.title.clone(),
                    excerpt: post_preview(p.excerpt.as_deref(), &p.content),
                    tags: p.tags.clone(),
                })
            })
            .collect()
    }

    fn moment_hits(&self, query: &SearchQuery) -> Vec<SearchItem> {
        self.moments
            .iter()
            .filter(|m| m.status == "published" && m.visibility == "public")
            .filter(|m| locale_matches(query, &m.locale))
            .filter(|m| date_matches(&query.filters, m.created_at))
            .filter(|m| {
                query.filters.location.as_deref().is_none_or(|location| {
                    contains_ci(m.location_name.as_deref().unwrap_or(""), location)
                })
            })
            .filter(|m| {
                let document = format!(
                    "{} {}",
                    m.content,
                    m.location_name.as_deref().unwrap_or("")
                );
                text_matches(&document, &query.text)
            })
            .map(|m| {
                SearchItem::Moment(MomentSearchItem {
                    id: m.id.to_string(),
                    section: SearchSection::Moment,
                    locale: normalize_locale(&m.locale).to_string(),
                    sort_at: m.created_at,
                    content: moment_preview(&m.content),
                    location_name: m.location_name.clone(),
                })
            })
            .collect()
    }

    fn gallery_hits(&self, query: &SearchQuery) -> Vec<SearchItem> {
        let filters = &query.filters;
        self.gallery
            .iter()
            .filter(|g| g.status == "published")
            .filter(|g| locale_matches(query, &g.locale))
            .filter(|g| date_matches(filters, g.created_at))
            .filter(|g| {
                [
                    (&g.camera, &filters.camera),
                    (&g.lens, &filters.lens),
                    (&g.focal_length, &filters.focal_length),
                    (&g.aperture, &filters.aperture),
                ]
                .into_iter()
                .all(|(field, wanted)| {
                    wanted
                        .as_deref()
                        .is_none_or(|w| contains_ci(field.as_deref().unwrap_or(""), w))
                })
            })
            .filter(|g| {
                filters.iso_min.is_none_or(|min| g.iso.is_some_and(|iso| iso >= min))
                    && filters.iso_max.is_none_or(|max| g.iso.is_some_and(|iso| iso <= max))
            })
            .filter(|g| {
                let document = [
                    g.title.as_deref().unwrap_or(""),
                    g.camera.as_deref().unwrap_or(""),
                    g.lens.as_deref().unwrap_or(""),
                    g.focal_length.as_deref().unwrap_or(""),
                    g.aperture.as_deref().unwrap_or(""),
                    &g.iso.map(|iso| iso.to_string()).unwrap_or_default(),
                ]
                .join(" ");
                text_matches(&document, &query.text)
            })
            .map(|g| {
                SearchItem::Gallery(GallerySearchItem {
                    id: g.id.to_string(),
                    section: SearchSection::Gallery,
                    locale: normalize_locale(&g.locale).to_string(),
                    sort_at: g.created_at,
                    title: g.title.clone(),
                    camera: g.camera.clone(),
                    lens: g.lens.clone(),
                    focal_length: g.focal_length.clone(),
                    aperture: g.aperture.clone(),
                    iso: g.iso,
                    thumb_url: g.thumb_url.clone(),
                    file_url: g.file_url.clone(),
                })
            })
            .collect()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Every whitespace-separated term must occur in the document.
fn text_matches(document: &str, text: &str) -> bool {
    let document = document.to_lowercase();
    text.split_whitespace()
        .all(|term| document.contains(&term.to_lowercase()))
}

fn locale_matches(query: &SearchQuery, locale: &str) -> bool {
    query.filters.locale_scope == LocaleScope::All || query.locale == locale
}

fn date_matches(filters: &NormalizedFilters, at: DateTime<Utc>) -> bool {
    filters.date_from.is_none_or(|from| at >= from) && filters.date_to.is_none_or(|to| at < to)
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn find_by_key_id(&self, key_id: &str) -> Result<Option<ApiKey>, AppError> {
        Ok(self.api_keys.get(key_id).map(|k| k.clone()))
    }

    async fn touch_last_used(&self, key_id: &str) -> Result<(), AppError> {
        if let Some(mut key) = self.api_keys.get_mut(key_id) {
            key.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn create_key(&self, new_key: NewApiKey) -> Result<ApiKey, AppError> {
        match self.api_keys.entry(new_key.key_id.clone()) {
            Entry::Occupied(_) => Err(AppError::Internal(format!(
                "duplicate key id {}",
                new_key.key_id
            ))),
            Entry::Vacant(slot) => {
                let key = ApiKey {
                    id: Uuid::new_v4(),
                    key_id: new_key.key_id,
                    name: new_key.name,
                    secret: new_key.secret,
                    scopes: new_key.scopes,
                    revoked_at: None,
                    created_at: Utc::now(),
                    last_used_at: None,
                };
                slot.insert(key.clone());
                Ok(key)
            }
        }
    }

    async fn list_keys(&self) -> Result<Vec<ApiKey>, AppError> {
        let mut keys: Vec<ApiKey> = self.api_keys.iter().map(|k| k.clone()).collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn rotate_key(&self, key_id: &str, new_secret: &str) -> Result<bool, AppError> {
        let Some(mut key) = self.api_keys.get_mut(key_id) else {
            return Ok(false);
        };
        key.secret = new_secret.to_string();
        key.revoked_at = None;
        Ok(true)
    }

    async fn revoke_key(&self, key_id: &str) -> Result<bool, AppError> {
        let Some(mut key) = self.api_keys.get_mut(key_id) else {
            return Ok(false);
        };
        if key.revoked_at.is_none() {
            key.revoked_at = Some(Utc::now());
        }
        Ok(true)
    }
}

#[async_trait]
impl NonceStore for MemoryStore {
    async fn insert_if_absent(
        &self,
        key_id: &str,
        nonce: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        match self.nonces.entry((key_id.to_string(), nonce.to_string())) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let before = self.nonces.len();
        self.nonces.retain(|_, expires_at| *expires_at >= now);
        Ok(before.saturating_sub(self.nonces.len()) as u64)
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn insert_in_progress(&self, key: &str, request_hash: &str) -> Result<bool, AppError> {
        match self.idempotency.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                slot.insert(IdempotencyRecord {
                    key: key.to_string(),
                    request_hash: request_hash.to_string(),
                    status: IdempotencyStatus::InProgress,
                    response: None,
                    created_at: now,
                    updated_at: now,
                });
                Ok(true)
            }
        }
    }

    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>, AppError> {
        Ok(self.idempotency_record(key))
    }

    async fn mark_completed(
        &self,
        key: &str,
        request_hash: &str,
        response: &Value,
    ) -> Result<bool, AppError> {
        let Some(mut record) = self.idempotency.get_mut(key) else {
            return Ok(false);
        };
        if record.request_hash != request_hash || record.status != IdempotencyStatus::InProgress {
            return Ok(false);
        }
        record.status = IdempotencyStatus::Completed;
        record.response = Some(response.clone());
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let before = self.idempotency.len();
        self.idempotency.retain(|_, record| {
            record.status != IdempotencyStatus::Completed || record.updated_at >= cutoff
        });
        Ok(before.saturating_sub(self.idempotency.len()) as u64)
    }

    async fn release_in_progress_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let before = self.idempotency.len();
        self.idempotency.retain(|_, record| {
            record.status != IdempotencyStatus::InProgress || record.created_at >= cutoff
        });
        Ok(before.saturating_sub(self.idempotency.len()) as u64)
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create_post(
        &self,
        post: NewPost,
        updated_by: Option<String>,
    ) -> Result<Post, AppError> {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            published_at: (post.status == "published").then_some(now),
            locale: post.locale,
            title: post.title,
            slug: post.slug,
            excerpt: post.excerpt,
            content: post.content,
            cover_url: post.cover_url,
            tags: post.tags,
            status: post.status,
            updated_by,
            created_at: now,
            updated_at: now,
        };
        self.posts.insert(post.id, post.clone());
        Ok(post)
    }
}

#[async_trait]
impl SearchStore for MemoryStore {
    async fn search(
        &self,
        query: &SearchQuery,
        cursor: Option<&SearchCursor>,
        fetch_limit: usize,
    ) -> Result<Vec<SearchItem>, AppError> {
        let mut hits = match query.section {
            SearchSection::Post => self.post_hits(query),
            SearchSection::Moment => self.moment_hits(query),
            SearchSection::Gallery => self.gallery_hits(query),
        };

        hits.retain(|item| cursor.is_none_or(|c| c.admits(item.sort_at(), item.id())));
        hits.sort_by(|a, b| {
            b.sort_at()
                .cmp(&a.sort_at())
                .then_with(|| b.id().cmp(a.id()))
        });
        hits.truncate(fetch_limit);
        Ok(hits)
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
