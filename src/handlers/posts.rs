//! Post creation endpoint.

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use serde_json::Value;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::content::{CreatePostRequest, PostEnvelope},
    services::idempotency::IDEMPOTENCY_KEY_HEADER,
    state::AppState,
    store::with_deadline,
};

/// Create a post.
///
/// # Idempotency
///
/// With an `Idempotency-Key` header the write happens at most once per key:
/// a retry with the same normalized payload replays the first response,
/// a different payload is rejected with `409 idempotency_conflict`.
///
/// # Request Body
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
///
/// # Response (201 Created)
///
/// ```json
/// { "item": { "id": "...", "slug": "hello", "status": "published", ... } }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: malformed JSON, unknown fields, blank title or content,
///   or an `Idempotency-Key` that is not UTF-8
/// - `409 Conflict`: idempotency conflict or a concurrent request in progress
pub async fn create_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    payload: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(req) = payload.map_err(|e| AppError::InvalidPayload(e.body_text()))?;
    let new_post = req.normalize().map_err(AppError::InvalidPayload)?;

    let idempotency_key = idempotency_key(&headers)?;

    let posts = state.posts.clone();
    let deadline = state.settings.store_timeout;
    let actor = auth.key_id.clone();
    let response = state
        .idempotency
        .run(idempotency_key, &new_post, || async {
            let post =
                with_deadline(deadline, posts.create_post(new_post.clone(), Some(actor))).await?;
            tracing::info!(post_id = %post.id, slug = %post.slug, "post created");
            Ok::<_, AppError>(PostEnvelope { item: post })
        })
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// The raw `Idempotency-Key` header. Non-ASCII UTF-8 keys are kept as sent;
/// a present but undecodable header is rejected instead of read as absent.
fn idempotency_key(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| {
            std::str::from_utf8(value.as_bytes()).map_err(|_| {
                AppError::InvalidPayload("Idempotency-Key must be valid UTF-8".to_string())
            })
        })
        .transpose()
}
