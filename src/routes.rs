//! HTTP router assembly.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    handlers,
    middleware::{
        auth::{self, RequiredScope},
        request_id,
    },
    state::AppState,
};

pub const SCOPE_CONTENT_WRITE: &str = "content:write";
pub const SCOPE_KEYS_ADMIN: &str = "keys:admin";

/// Build the full application router.
///
/// # Layers (outermost first)
///
/// 1. Request id: picks or generates `X-Request-Id` and echoes it
/// 2. Tracing of every request
/// 3. Body size limit for extractors
/// 4. On `/v1` write routes only: signature auth, then the route's scope
pub fn build_router(state: AppState) -> Router {
    let content_routes = Router::new()
        .route("/v1/posts", post(handlers::posts::create_post))
        .route_layer(axum_middleware::from_fn_with_state(
            RequiredScope(SCOPE_CONTENT_WRITE),
            auth::require_scope,
        ));

    let key_routes = Router::new()
        .route(
            "/v1/keys",
            post(handlers::keys::create_key).get(handlers::keys::list_keys),
        )
        .route("/v1/keys/{id}/rotate", post(handlers::keys::rotate_key))
        .route("/v1/keys/{id}/revoke", post(handlers::keys::revoke_key))
        .route_layer(axum_middleware::from_fn_with_state(
            RequiredScope(SCOPE_KEYS_ADMIN),
            auth::require_scope,
        ));

    // Scope layers above run inside the signature check
    let authenticated_routes = Router::new()
        .merge(content_routes)
        .merge(key_routes)
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/healthz", get(handlers::health::healthz))
        .route("/readyz", get(handlers::health::readyz))
        .route("/v1/public/search", post(handlers::search::public_search))
        .merge(authenticated_routes)
        .layer(DefaultBodyLimit::max(state.settings.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}
