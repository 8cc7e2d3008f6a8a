//! Liveness and readiness endpoints for service monitoring.

use crate::{error::AppError, state::AppState, store::with_deadline};
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status
    pub status: String,

    /// Store connectivity, only reported by readiness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
}

/// Liveness: the process is up and serving HTTP.
///
/// # Response (200 OK)
///
/// ```json
/// { "status": "ok", "timestamp": "2025-12-21T19:00:00Z" }
/// ```
pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        database: None,
        timestamp: Utc::now(),
    })
}

/// Readiness: the store answers within its deadline.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "ready",
///   "database": "connected",
///   "timestamp": "2025-12-21T19:00:00Z"
/// }
/// ```
///
/// # Errors
///
/// The standard error envelope with `store_timeout` (503) or
/// `internal_error` (500) when the store is unreachable.
pub async fn readyz(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    with_deadline(state.settings.store_timeout, state.health.ping()).await?;

    Ok(Json(HealthResponse {
        status: "ready".to_string(),
        database: Some("connected".to_string()),
        timestamp: Utc::now(),
    }))
}
