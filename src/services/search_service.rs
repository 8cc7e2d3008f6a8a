//! Public search: normalize, decode the cursor, fetch one extra row, paginate.

use std::time::Duration;

use crate::error::AppError;
use crate::models::search::{SearchItem, SearchRequest, SearchResponse};
use crate::services::search_cursor::{SearchCursor, paginate};
use crate::store::{SearchStore, with_deadline};

/// Run one page of a search.
///
/// # Process
///
/// 1. Validate the request (query length, filters, cursor, section); a blank
///    cursor starts at the first page
/// 2. Fetch `limit + 1` rows after the cursor
/// 3. Trim to `limit` and derive `nextCursor` from the last returned row
///
/// # Errors
///
/// - Validation errors from [`SearchRequest::normalize`], including
///   `InvalidCursor` when the cursor token cannot be decoded
/// - `StoreTimeout` / `Database`: the fetch failed
pub async fn search(
    store: &dyn SearchStore,
    deadline: Duration,
    request: &SearchRequest,
) -> Result<SearchResponse, AppError> {
    let query = request.normalize()?;

    let rows = with_deadline(
        deadline,
        store.search(&query, query.cursor.as_ref(), query.limit + 1),
    )
    .await?;

    let page = paginate(rows, query.limit, cursor_for)?;
    tracing::debug!(
        section = ?query.section,
        returned = page.items.len(),
        has_more = page.has_more,
        "search page served"
    );

    Ok(SearchResponse {
        items: page.items,
        next_cursor: page.next_cursor,
        has_more: page.has_more,
    })
}

fn cursor_for(item: &SearchItem) -> SearchCursor {
    SearchCursor::new(item.sort_at(), item.id())
}
