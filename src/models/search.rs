//! Search request/response types and request normalization.
//!
//! A raw [`SearchRequest`] is validated into a [`SearchQuery`], cursor
//! included, before any SQL is built.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::content::normalize_locale;
use crate::services::search_cursor::SearchCursor;

const MIN_QUERY_CHARS: usize = 2;
const MAX_QUERY_CHARS: usize = 200;
const DEFAULT_LIMIT: usize = 12;
const MAX_LIMIT: usize = 30;
const POST_EXCERPT_CHARS: usize = 180;
const MOMENT_CONTENT_CHARS: usize = 220;

/// Searchable entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSection {
    Post,
    Moment,
    Gallery,
}

impl SearchSection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "post" => Some(SearchSection::Post),
            "moment" => Some(SearchSection::Moment),
            "gallery" => Some(SearchSection::Gallery),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocaleScope {
    /// Every locale
    #[default]
    All,
    /// Only the request's locale
    Current,
}

/// Body of `POST /v1/public/search`.
///
/// # JSON Example
///
/// ```json
/// {
///   "section": "gallery",
///   "query": "street night",
///   "locale": "en",
///   "filters": { "camera": "X100", "isoMin": 800 },
///   "cursor": null,
///   "limit": 12
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchRequest {
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub filters: SearchFilters,
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchFilters {
    pub locale_scope: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub location: Option<String>,
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub focal_length: Option<String>,
    pub aperture: Option<String>,
    pub iso_min: Option<i32>,
    pub iso_max: Option<i32>,
}

/// Validated filters. Blank strings are gone and dates are UTC bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedFilters {
    pub locale_scope: LocaleScope,
    /// Inclusive lower bound: start of `dateFrom`
    pub date_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound: start of the day after `dateTo`
    pub date_to: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub location: Option<String>,
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub focal_length: Option<String>,
    pub aperture: Option<String>,
    pub iso_min: Option<i32>,
    pub iso_max: Option<i32>,
}

/// A validated search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub section: SearchSection,
    pub text: String,
    pub locale: String,
    pub limit: usize,
    pub filters: NormalizedFilters,
    /// Position after which the page starts, `None` for the first page
    pub cursor: Option<SearchCursor>,
}

impl SearchRequest {
    /// Validate the request into a [`SearchQuery`].
    ///
    /// Checks run in the order clients have always seen them reported:
    /// query length, filters, cursor, section.
    pub fn normalize(&self) -> Result<SearchQuery, AppError> {
        let text = self.query.trim().to_string();
        let chars = text.chars().count();
        if chars < MIN_QUERY_CHARS {
            return Err(AppError::QueryTooShort);
        }
        if chars > MAX_QUERY_CHARS {
            return Err(AppError::QueryTooLong);
        }

        let filters = self.filters.normalize()?;
        let cursor = match self.cursor.as_deref() {
            Some(raw) => SearchCursor::decode(raw)?,
            None => None,
        };
        let section = SearchSection::parse(self.section.trim()).ok_or(AppError::InvalidSection)?;

        Ok(SearchQuery {
            section,
            text,
            locale: normalize_locale(self.locale.trim()).to_string(),
            limit: normalize_limit(self.limit),
            filters,
            cursor,
        })
    }
}

impl SearchFilters {
    fn normalize(&self) -> Result<NormalizedFilters, AppError> {
        let locale_scope = match self.locale_scope.as_deref().map(str::trim) {
            None | Some("") | Some("all") => LocaleScope::All,
            Some("current") => LocaleScope::Current,
            Some(_) => return Err(AppError::InvalidFilters("invalid localeScope".to_string())),
        };

        if self.iso_min.is_some_and(|v| v < 0) {
            return Err(AppError::InvalidFilters("isoMin must be >= 0".to_string()));
        }
        if self.iso_max.is_some_and(|v| v < 0) {
            return Err(AppError::InvalidFilters("isoMax must be >= 0".to_string()));
        }
        if let (Some(min), Some(max)) = (self.iso_min, self.iso_max) {
            if min > max {
                return Err(AppError::InvalidFilters(
                    "isoMin cannot be greater than isoMax".to_string(),
                ));
            }
        }

        let date_from = match trim_non_empty(&self.date_from) {
            Some(raw) => Some(
                parse_day_start_utc(&raw)
                    .ok_or_else(|| AppError::InvalidFilters("invalid dateFrom".to_string()))?,
            ),
            None => None,
        };
        let date_to = match trim_non_empty(&self.date_to) {
            Some(raw) => Some(
                parse_day_start_utc(&raw)
                    .and_then(|day| day.checked_add_days(Days::new(1)))
                    .ok_or_else(|| AppError::InvalidFilters("invalid dateTo".to_string()))?,
            ),
            None => None,
        };

        Ok(NormalizedFilters {
            locale_scope,
            date_from,
            date_to,
            tags: self
                .tags
                .iter()
                .map(|tag| tag.trim())
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
            location: trim_non_empty(&self.location),
            camera: trim_non_empty(&self.camera),
            lens: trim_non_empty(&self.lens),
            focal_length: trim_non_empty(&self.focal_length),
            aperture: trim_non_empty(&self.aperture),
            iso_min: self.iso_min,
            iso_max: self.iso_max,
        })
    }
}

fn normalize_limit(limit: i64) -> usize {
    match limit {
        l if l <= 0 => DEFAULT_LIMIT,
        l if l > MAX_LIMIT as i64 => MAX_LIMIT,
        l => l as usize,
    }
}

fn trim_non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_day_start_utc(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
}

/// Truncate to `max_chars` characters, ending with `...` when shortened.
pub fn shorten_text(input: &str, max_chars: usize) -> String {
    let text = input.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let mut shortened: String = text.chars().take(max_chars - 3).collect();
    shortened.push_str("...");
    shortened
}

/// Preview text for a post hit: its excerpt, or its content when the excerpt is blank.
pub fn post_preview(excerpt: Option<&str>, content: &str) -> String {
    let source = match excerpt.map(str::trim) {
        Some(excerpt) if !excerpt.is_empty() => excerpt,
        _ => content,
    };
    shorten_text(source, POST_EXCERPT_CHARS)
}

/// Moment content as shown in search results.
pub fn moment_preview(content: &str) -> String {
    shorten_text(content, MOMENT_CONTENT_CHARS)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSearchItem {
    pub id: String,
    pub section: SearchSection,
    pub locale: String,
    pub sort_at: DateTime<Utc>,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MomentSearchItem {
    pub id: String,
    pub section: SearchSection,
    pub locale: String,
    pub sort_at: DateTime<Utc>,
    pub content: String,
    pub location_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GallerySearchItem {
    pub id: String,
    pub section: SearchSection,
    pub locale: String,
    pub sort_at: DateTime<Utc>,
    pub title: Option<String>,
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub focal_length: Option<String>,
    pub aperture: Option<String>,
    pub iso: Option<i32>,
    pub thumb_url: Option<String>,
    pub file_url: String,
}

/// One search hit. Serializes as the inner item; `section` tells them apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchItem {
    Post(PostSearchItem),
    Moment(MomentSearchItem),
    Gallery(GallerySearchItem),
}

impl SearchItem {
    pub fn id(&self) -> &str {
        match self {
            SearchItem::Post(item) => &item.id,
            SearchItem::Moment(item) => &item.id,
            SearchItem::Gallery(item) => &item.id,
        }
    }

    pub fn sort_at(&self) -> DateTime<Utc> {
        match self {
            SearchItem::Post(item) => item.sort_at,
            SearchItem::Moment(item) => item.sort_at,
            SearchItem::Gallery(item) => item.sort_at,
        }
    }
}

/// Response body of a search page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub items: Vec<SearchItem>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(section: &str, query: &str) -> SearchRequest {
        SearchRequest {
            section: section.to_string(),
            query: query.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn query_length_is_bounded() {
        assert!(matches!(
            request("post", " a ").normalize(),
            Err(AppError::QueryTooShort)
        ));
        assert!(matches!(
            request("post", &"x".repeat(201)).normalize(),
            Err(AppError::QueryTooLong)
        ));
        assert!(request("post", &"字".repeat(200)).normalize().is_ok());
    }

    #[test]
    fn section_locale_and_limit_normalize() {
        assert!(matches!(
            request("video", "rust").normalize(),
            Err(AppError::InvalidSection)
        ));

        let mut req = request("moment", "  rust  ");
        req.locale = "fr".to_string();
        req.limit = 500;
        let query = req.normalize().unwrap();
        assert_eq!(query.section, SearchSection::Moment);
        assert_eq!(query.text, "rust");
        assert_eq!(query.locale, "en");
        assert_eq!(query.limit, MAX_LIMIT);

        req.limit = -1;
        assert_eq!(req.normalize().unwrap().limit, DEFAULT_LIMIT);
    }

    #[test]
    fn bad_cursor_is_reported_before_bad_section() {
        let mut req = request("video", "rust");
        req.cursor = Some("%%%".to_string());
        assert!(matches!(req.normalize(), Err(AppError::InvalidCursor)));

        req.filters.iso_min = Some(-5);
        assert!(matches!(req.normalize(), Err(AppError::InvalidFilters(_))));

        let mut req = request("moment", "rust");
        let cursor = SearchCursor::new(Utc::now(), "abc");
        req.cursor = Some(cursor.encode().unwrap());
        assert_eq!(req.normalize().unwrap().cursor, Some(cursor));
    }

    #[test]
    fn filters_validate_iso_and_dates() {
        let mut req = request("gallery", "night");
        req.filters.iso_min = Some(1600);
        req.filters.iso_max = Some(100);
        assert!(matches!(req.normalize(), Err(AppError::InvalidFilters(_))));

        let mut req = request("gallery", "night");
        req.filters.date_from = Some("2025-13-01".to_string());
        assert!(matches!(req.normalize(), Err(AppError::InvalidFilters(_))));

        let mut req = request("gallery", "night");
        req.filters.locale_scope = Some("nearby".to_string());
        assert!(matches!(req.normalize(), Err(AppError::InvalidFilters(_))));
    }

    #[test]
    fn date_to_is_exclusive_next_day() {
        let mut req = request("post", "rust");
        req.filters.date_from = Some("2025-03-01".to_string());
        req.filters.date_to = Some(" 2025-03-31 ".to_string());
        req.filters.camera = Some("   ".to_string());
        let filters = req.normalize().unwrap().filters;

        assert_eq!(
            filters.date_from.unwrap().to_rfc3339(),
            "2025-03-01T00:00:00+00:00"
        );
        assert_eq!(
            filters.date_to.unwrap().to_rfc3339(),
            "2025-04-01T00:00:00+00:00"
        );
        assert_eq!(filters.camera, None);
    }

    #[test]
    fn shorten_text_counts_characters() {
        assert_eq!(shorten_text("  short  ", 10), "short");
        assert_eq!(shorten_text("abcdefghij", 6), "abc...");
        assert_eq!(shorten_text("日本語テキスト", 5), "日本...");
        assert_eq!(shorten_text("abcdef", 2), "ab");
    }

    #[test]
    fn post_preview_falls_back_to_content() {
        assert_eq!(post_preview(Some("  teaser "), "body"), "teaser");
        assert_eq!(post_preview(Some("   "), "body"), "body");
        assert_eq!(post_preview(None, &"x".repeat(300)).chars().count(), 180);
        assert_eq!(moment_preview(&"y".repeat(300)).chars().count(), 220);
    }
}
