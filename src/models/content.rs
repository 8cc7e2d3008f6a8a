//! Content entities: posts, moments and gallery items.
//!
//! Only the fields the write path and search need are modeled here. Field
//! validation beyond the basics lives with the content owners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a post record from the database.
///
/// # Sort timestamp
///
/// `published_at` is assigned once, when the post is first published, and
/// never moves afterwards. Search orders posts by
/// `COALESCE(published_at, created_at)`, so a visible post keeps its place
/// in any pagination already in flight.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub locale: String,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub cover_url: Option<String>,
    pub tags: Vec<String>,

    /// One of `draft`, `published`, `archived`
    pub status: String,

    pub published_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Timestamp the post is ordered by in search.
    pub fn sort_at(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

/// Request to create a post.
///
/// # JSON Example
///
/// ```json
/// {
///   "locale": "en",
///   "title": "Hello",
///   "content": "First post",
///   "tags": ["intro"],
///   "status": "published"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: String,
    pub cover_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: String,
}

/// A validated post, ready to insert.
///
/// Serializes into the payload that is hashed for idempotency, so two
/// requests normalizing to the same value are the same logical write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub locale: String,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub cover_url: Option<String>,
    pub tags: Vec<String>,
    pub status: String,
}

impl CreatePostRequest {
    /// Trim, default and validate the request.
    ///
    /// # Errors
    ///
    /// Returns a message when title or content is blank.
    pub fn normalize(self) -> Result<NewPost, String> {
        let title = self.title.trim().to_string();
        let content = self.content.trim().to_string();
        if title.is_empty() || content.is_empty() {
            return Err("title and content are required".to_string());
        }

        let slug = match self.slug.trim() {
            "" => slugify(&title),
            explicit => explicit.to_string(),
        };

        Ok(NewPost {
            locale: normalize_locale(self.locale.trim()).to_string(),
            slug,
            title,
            excerpt: trim_optional(self.excerpt),
            content,
            cover_url: trim_optional(self.cover_url),
            tags: self
                .tags
                .iter()
                .map(|tag| tag.trim())
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
            status: normalize_status(self.status.trim()).to_string(),
        })
    }
}

/// Envelope returned for a created post.
#[derive(Debug, Serialize)]
pub struct PostEnvelope {
    pub item: Post,
}

/// Represents a moment record: a short status update.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Moment {
    pub id: Uuid,
    pub locale: String,
    pub content: String,
    pub location_name: Option<String>,
    pub status: String,

    /// `public` or `private`; only public moments are searchable
    pub visibility: String,

    pub created_at: DateTime<Utc>,
}

/// Represents a gallery photo with its EXIF-derived fields.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GalleryItem {
    pub id: Uuid,
    pub locale: String,
    pub title: Option<String>,
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub focal_length: Option<String>,
    pub aperture: Option<String>,
    pub iso: Option<i32>,
    pub thumb_url: Option<String>,
    pub file_url: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Only `zh` is recognized; everything else is English.
pub fn normalize_locale(input: &str) -> &'static str {
    if input == "zh" { "zh" } else { "en" }
}

fn normalize_status(input: &str) -> &'static str {
    match input {
        "published" => "published",
        "archived" => "archived",
        _ => "draft",
    }
}

fn trim_optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

/// URL slug from a title: lowercase alphanumerics (any script) joined by `-`,
/// at most 100 characters, `untitled` when nothing survives.
pub fn slugify(input: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;

    for ch in input.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }

    let slug: String = slug.chars().take(100).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}
