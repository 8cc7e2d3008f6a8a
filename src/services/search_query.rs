//! Parameterized SQL assembly for cross-entity search.
//!
//! Each section is described once by a [`SearchEntity`]: its table, sort
//! expression, full-text document and fixed visibility predicates. Filters
//! and the cursor boundary are appended through `sqlx::QueryBuilder`, so
//! every user-supplied value is a bind parameter and never part of the SQL
//! text.

use sqlx::{Postgres, QueryBuilder};

use crate::models::search::{LocaleScope, SearchQuery, SearchSection};
use crate::services::search_cursor::SearchCursor;

/// Static description of a searchable table.
#[derive(Debug)]
pub struct SearchEntity {
    pub table: &'static str,
    pub columns: &'static str,
    /// Timestamp that orders results; immutable once the row is visible
    pub sort_expr: &'static str,
    /// Identifier compared bytewise as the tie-breaker
    pub id_expr: &'static str,
    /// Text fed to `to_tsvector`
    pub document_expr: &'static str,
    /// Visibility conditions that always apply
    pub base_predicates: &'static [&'static str],
}

const POST_ENTITY: SearchEntity = SearchEntity {
    table: "posts",
    columns: "id::text AS id, locale, slug, title, excerpt, content, tags",
    sort_expr: "COALESCE(published_at, created_at)",
    id_expr: "id::text COLLATE \"C\"",
    document_expr: "COALESCE(title, '') || ' ' || COALESCE(excerpt, '') || ' ' || \
                    COALESCE(content, '') || ' ' || array_to_string(tags, ' ')",
    base_predicates: &["status = 'published'", "deleted_at IS NULL"],
};

const MOMENT_ENTITY: SearchEntity = SearchEntity {
    table: "moments",
    columns: "id::text AS id, locale, content, location_name",
    sort_expr: "created_at",
    id_expr: "id::text COLLATE \"C\"",
    document_expr: "COALESCE(content, '') || ' ' || COALESCE(location_name, '')",
    base_predicates: &[
        "status = 'published'",
        "visibility = 'public'",
        "deleted_at IS NULL",
    ],
};

const GALLERY_ENTITY: SearchEntity = SearchEntity {
    table: "gallery",
    columns: "id::text AS id, locale, title, camera, lens, focal_length, aperture, iso, \
              thumb_url, file_url",
    sort_expr: "created_at",
    id_expr: "id::text COLLATE \"C\"",
    document_expr: "COALESCE(title, '') || ' ' || COALESCE(camera, '') || ' ' || \
                    COALESCE(lens, '') || ' ' || COALESCE(focal_length, '') || ' ' || \
                    COALESCE(aperture, '') || ' ' || COALESCE(iso::text, '')",
    base_predicates: &["status = 'published'", "deleted_at IS NULL"],
};

impl SearchSection {
    pub fn entity(self) -> &'static SearchEntity {
        match self {
            SearchSection::Post => &POST_ENTITY,
            SearchSection::Moment => &MOMENT_ENTITY,
            SearchSection::Gallery => &GALLERY_ENTITY,
        }
    }
}

/// Escape `\`, `%` and `_` and wrap in `%...%` for `ILIKE ... ESCAPE '\'`.
pub fn like_pattern(input: &str) -> String {
    let escaped = input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Build the page query for `query`, fetching `fetch_limit` rows after `cursor`.
pub fn build_search_query(
    query: &SearchQuery,
    cursor: Option<&SearchCursor>,
    fetch_limit: usize,
) -> QueryBuilder<'static, Postgres> {
    let entity = query.section.entity();
    let filters = &query.filters;

    let mut builder = QueryBuilder::new("SELECT ");
    builder
        .push(entity.columns)
        .push(", ")
        .push(entity.sort_expr)
        .push(" AS sort_at FROM ")
        .push(entity.table)
        .push(" WHERE ");

    {
        let mut conditions = builder.separated(" AND ");
        for predicate in entity.base_predicates {
            conditions.push(*predicate);
        }

        conditions
            .push(format!("to_tsvector('simple', {}) @@ plainto_tsquery('simple', ", entity.document_expr))
            .push_bind_unseparated(query.text.clone())
            .push_unseparated(")");

        if filters.locale_scope == LocaleScope::Current {
            conditions
                .push("locale = ")
                .push_bind_unseparated(query.locale.clone());
        }
        if let Some(from) = filters.date_from {
            conditions
                .push(format!("{} >= ", entity.sort_expr))
                .push_bind_unseparated(from);
        }
        if let Some(to) = filters.date_to {
            conditions
                .push(format!("{} < ", entity.sort_expr))
                .push_bind_unseparated(to);
        }

        let mut push_like = |column: &str, value: &str| {
            conditions
                .push(format!("{column} ILIKE "))
                .push_bind_unseparated(like_pattern(value))
                .push_unseparated(" ESCAPE '\\'");
        };
        match query.section {
            SearchSection::Post => {
                for tag in &filters.tags {
                    push_like("array_to_string(tags, ' ')", tag);
                }
            }
            SearchSection::Moment => {
                if let Some(location) = &filters.location {
                    push_like("COALESCE(location_name, '')", location);
                }
            }
            SearchSection::Gallery => {
                for (column, value) in [
                    ("COALESCE(camera, '')", &filters.camera),
                    ("COALESCE(lens, '')", &filters.lens),
                    ("COALESCE(focal_length, '')", &filters.focal_length),
                    ("COALESCE(aperture, '')", &filters.aperture),
                ] {
                    if let Some(value) = value {
                        push_like(column, value);
                    }
                }
            }
        }

        if query.section == SearchSection::Gallery {
            if let Some(min) = filters.iso_min {
                conditions.push("iso >= ").push_bind_unseparated(min);
            }
            if let Some(max) = filters.iso_max {
                conditions.push("iso <= ").push_bind_unseparated(max);
            }
        }

        if let Some(cursor) = cursor {
            conditions
                .push(format!("({} < ", entity.sort_expr))
                .push_bind_unseparated(cursor.sort_at)
                .push_unseparated(format!(" OR ({} = ", entity.sort_expr))
                .push_bind_unseparated(cursor.sort_at)
                .push_unseparated(format!(" AND {} < ", entity.id_expr))
                .push_bind_unseparated(cursor.id.clone())
                .push_unseparated("))");
        }
    }

    builder
        .push(" ORDER BY ")
        .push(entity.sort_expr)
        .push(" DESC, ")
        .push(entity.id_expr)
        .push(" DESC LIMIT ")
        .push_bind(fetch_limit as i64);

    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::search::NormalizedFilters;
    use chrono::{TimeZone, Utc};

    fn query(section: SearchSection) -> SearchQuery {
        SearchQuery {
            section,
            text: "night street".to_string(),
            locale: "en".to_string(),
            limit: 12,
            filters: NormalizedFilters::default(),
            cursor: None,
        }
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn post_query_orders_and_limits() {
        let builder = build_search_query(&query(SearchSection::Post), None, 13);
        let sql = builder.sql();
        assert!(sql.starts_with("SELECT id::text AS id, locale, slug"));
        assert!(sql.contains("FROM posts WHERE status = 'published' AND deleted_at IS NULL AND "));
        assert!(sql.contains("plainto_tsquery('simple', $1)"));
        assert!(sql.ends_with(
            "ORDER BY COALESCE(published_at, created_at) DESC, id::text COLLATE \"C\" DESC LIMIT $2"
        ));
    }

    #[test]
    fn cursor_adds_strict_boundary() {
        let cursor = SearchCursor::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(), "abc");
        let builder = build_search_query(&query(SearchSection::Moment), Some(&cursor), 13);
        let sql = builder.sql();
        assert!(sql.contains(
            "AND (created_at < $2 OR (created_at = $3 AND id::text COLLATE \"C\" < $4)) ORDER BY"
        ));
        assert!(sql.contains("visibility = 'public'"));
        assert!(sql.ends_with("LIMIT $5"));
    }

    #[test]
    fn values_are_bound_never_inlined() {
        let mut q = query(SearchSection::Gallery);
        q.text = "x'; DROP TABLE gallery; --".to_string();
        q.filters.locale_scope = LocaleScope::Current;
        q.filters.camera = Some("Fuji' OR '1'='1".to_string());
        q.filters.iso_min = Some(100);
        q.filters.iso_max = Some(3200);
        q.filters.tags = vec!["ignored-for-gallery".to_string()];

        let builder = build_search_query(&q, None, 31);
        let sql = builder.sql();
        assert!(!sql.contains("DROP TABLE"));
        assert!(!sql.contains("Fuji"));
        assert!(!sql.contains("ignored-for-gallery"));
        assert!(sql.contains("locale = $2"));
        assert!(sql.contains("COALESCE(camera, '') ILIKE $3 ESCAPE '\\'"));
        assert!(sql.contains("iso >= $4 AND iso <= $5"));
        assert!(sql.ends_with("LIMIT $6"));
    }

    #[test]
    fn section_specific_filters_only_apply_to_their_section() {
        let mut q = query(SearchSection::Post);
        q.filters.location = Some("Berlin".to_string());
        q.filters.iso_min = Some(100);
        q.filters.tags = vec!["rust".to_string(), "axum".to_string()];

        let builder = build_search_query(&q, None, 13);
        let sql = builder.sql();
        assert!(!sql.contains("location_name"));
        assert!(!sql.contains("iso >="));
        assert_eq!(sql.matches("array_to_string(tags, ' ') ILIKE").count(), 2);
    }
}
