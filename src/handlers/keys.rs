//! API key management endpoints. All require the `keys:admin` scope.

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::api_key::{
        ApiKeyList, CreateKeyRequest, IssuedKeyResponse, RevokedKeyResponse, RotatedKeyResponse,
    },
    services::key_service,
    state::AppState,
};

/// Issue a new API key.
///
/// # Request Body
///
/// ```json
/// { "name": "publisher", "scopes": ["content:write"] }
/// ```
///
/// # Response (201 Created)
///
/// ```json
/// {
///   "item": { "id": "...", "keyId": "k_1a2b3c4d5e6f", "name": "publisher", "scopes": ["content:write"], ... },
///   "secret": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822c"
/// }
/// ```
///
/// The secret is returned only here and on rotation.
pub async fn create_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<CreateKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IssuedKeyResponse>), AppError> {
    let Json(req) = payload.map_err(|e| AppError::InvalidPayload(e.body_text()))?;

    let issued = key_service::issue_key(
        state.api_keys.as_ref(),
        state.settings.store_timeout,
        &req.name,
        &req.scopes,
    )
    .await?;
    tracing::info!(actor = %auth.key_id, key_id = %issued.item.key_id, "key.create");

    Ok((StatusCode::CREATED, Json(issued)))
}

/// List all keys, newest first. Secrets are never included.
pub async fn list_keys(State(state): State<AppState>) -> Result<Json<ApiKeyList>, AppError> {
    let items = key_service::list_keys(state.api_keys.as_ref(), state.settings.store_timeout).await?;
    Ok(Json(ApiKeyList { items }))
}

/// Replace a key's secret and clear its revocation.
///
/// # Errors
///
/// - `404 Not Found`: unknown key id
pub async fn rotate_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<String>,
) -> Result<Json<RotatedKeyResponse>, AppError> {
    let rotated =
        key_service::rotate_key(state.api_keys.as_ref(), state.settings.store_timeout, &key_id)
            .await?;
    tracing::info!(actor = %auth.key_id, key_id = %key_id, "key.rotate");

    Ok(Json(rotated))
}

/// Revoke a key. Later requests signed with it fail with `invalid_key`.
pub async fn revoke_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<String>,
) -> Result<Json<RevokedKeyResponse>, AppError> {
    let revoked =
        key_service::revoke_key(state.api_keys.as_ref(), state.settings.store_timeout, &key_id)
            .await?;
    tracing::info!(actor = %auth.key_id, key_id = %key_id, "key.revoke");

    Ok(Json(revoked))
}
