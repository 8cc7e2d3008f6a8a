//! Public search endpoint.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

use crate::{
    error::AppError,
    models::search::{SearchRequest, SearchResponse},
    services::search_service,
    state::AppState,
};

/// Search published content with keyset pagination.
///
/// # Request Body
///
/// ```json
/// { "section": "post", "query": "rust", "locale": "en", "limit": 12, "cursor": null }
/// ```
///
/// # Response (200 OK)
///
/// ```json
/// { "items": [ ... ], "nextCursor": "eyJzb3J0QXQiOi...", "hasMore": true }
/// ```
///
/// Pass `nextCursor` back unchanged to fetch the following page.
///
/// # Errors
///
/// - `400 Bad Request`: `query_too_short`, `query_too_long`, `invalid_section`,
///   `invalid_filters`, `invalid_cursor`, `invalid_payload`
pub async fn public_search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::InvalidPayload(e.body_text()))?;
    let response =
        search_service::search(state.search.as_ref(), state.settings.store_timeout, &req).await?;
    Ok(Json(response))
}
