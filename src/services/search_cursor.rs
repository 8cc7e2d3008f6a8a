//! Opaque cursors for descending keyset pagination.
//!
//! A cursor names the last row a client has seen as `(sort_at, id)`. Every
//! searchable entity is totally ordered by `(sort_at DESC, id DESC)`, so the
//! next page is exactly the rows with
//! `sort_at < c.sort_at OR (sort_at = c.sort_at AND id < c.id)`.
//!
//! # Token format
//!
//! URL-safe base64 (no padding) of `{"sortAt": "<RFC3339 nanos>", "id": "<id>"}`.
//! Clients must treat it as opaque.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Decoded position of the last row on the previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCursor {
    pub sort_at: DateTime<Utc>,
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorPayload {
    sort_at: String,
    id: String,
}

impl SearchCursor {
    pub fn new(sort_at: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            sort_at,
            id: id.into(),
        }
    }

    /// Encode into the opaque token returned as `nextCursor`.
    pub fn encode(&self) -> Result<String, AppError> {
        let payload = CursorPayload {
            sort_at: self.sort_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            id: self.id.clone(),
        };
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?))
    }

    /// Decode a client-supplied token. A blank token means "first page".
    ///
    /// # Errors
    ///
    /// [`AppError::InvalidCursor`] for bad base64, bad JSON, missing or empty
    /// fields, or an unparsable timestamp.
    pub fn decode(raw: &str) -> Result<Option<Self>, AppError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|_| AppError::InvalidCursor)?;
        let payload: CursorPayload =
            serde_json::from_slice(&bytes).map_err(|_| AppError::InvalidCursor)?;
        if payload.id.is_empty() || payload.sort_at.is_empty() {
            return Err(AppError::InvalidCursor);
        }

        let sort_at = DateTime::parse_from_rfc3339(&payload.sort_at)
            .map_err(|_| AppError::InvalidCursor)?
            .with_timezone(&Utc);

        Ok(Some(Self {
            sort_at,
            id: payload.id,
        }))
    }

    /// Whether a row at `(sort_at, id)` comes strictly after this cursor.
    pub fn admits(&self, sort_at: DateTime<Utc>, id: &str) -> bool {
        sort_at < self.sort_at || (sort_at == self.sort_at && id < self.id.as_str())
    }
}

/// A page of rows plus the cursor for the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Cut a `limit + 1` fetch down to a page.
///
/// The extra row only signals that more exist; the next cursor points at the
/// last row actually returned.
pub fn paginate<T, F>(mut rows: Vec<T>, limit: usize, key: F) -> Result<Page<T>, AppError>
where
    F: Fn(&T) -> SearchCursor,
{
    let has_more = rows.len() > limit;
    if !has_more {
        return Ok(Page {
            items: rows,
            next_cursor: None,
            has_more: false,
        });
    }

    rows.truncate(limit);
    let next_cursor = match rows.last() {
        Some(last) => Some(key(last).encode()?),
        None => None,
    };

    Ok(Page {
        items: rows,
        next_cursor,
        has_more: true,
    })
}
