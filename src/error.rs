//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::middleware::request_id;

/// Application-wide error type.
///
/// Each variant maps to a stable error `code`, an HTTP status and a
/// `retryable` hint for the client.
///
/// # Error Categories
///
/// - **Malformed requests**: missing headers, bad payloads, unparsable cursors (400)
/// - **Authentication**: bad timestamp, key, signature or a replayed nonce (401)
/// - **Authorization**: missing scope (403)
/// - **Idempotency**: key reused with another payload, or still executing (409)
/// - **Store failures**: database errors (500) and deadline expiry (503), both retryable
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A store call did not finish before its deadline.
    #[error("Store operation timed out")]
    StoreTimeout,

    /// JSON (de)serialization of a stored or computed value failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other server-side failure. The message is logged, never returned.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("missing required auth headers")]
    MissingAuthHeaders,

    #[error("timestamp is outside accepted window")]
    InvalidTimestamp,

    /// Unknown and revoked keys share this variant so callers cannot
    /// enumerate key identifiers.
    #[error("api key is not valid")]
    InvalidKey,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("nonce has already been used")]
    NonceReused,

    /// Authenticated, but the key lacks the named scope.
    #[error("missing required scope: {0}")]
    Forbidden(String),

    #[error("idempotency key already used with another payload")]
    IdempotencyConflict,

    #[error("request with this idempotency key is already in progress")]
    IdempotencyInProgress,

    #[error("invalid cursor")]
    InvalidCursor,

    #[error("{0}")]
    InvalidPayload(String),

    #[error("query must be at least 2 characters")]
    QueryTooShort,

    #[error("query must be <= 200 characters")]
    QueryTooLong,

    #[error("section must be one of post|moment|gallery")]
    InvalidSection,

    #[error("{0}")]
    InvalidFilters(String),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("resource not found")]
    NotFound,
}

impl AppError {
    /// Stable machine-readable code placed in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                "internal_error"
            }
            AppError::StoreTimeout => "store_timeout",
            AppError::MissingAuthHeaders => "missing_auth_headers",
            AppError::InvalidTimestamp => "invalid_timestamp",
            AppError::InvalidKey => "invalid_key",
            AppError::InvalidSignature => "invalid_signature",
            AppError::NonceReused => "nonce_reused",
            AppError::Forbidden(_) => "forbidden",
            AppError::IdempotencyConflict => "idempotency_conflict",
            AppError::IdempotencyInProgress => "idempotency_in_progress",
            AppError::InvalidCursor => "invalid_cursor",
            AppError::InvalidPayload(_) => "invalid_payload",
            AppError::QueryTooShort => "query_too_short",
            AppError::QueryTooLong => "query_too_long",
            AppError::InvalidSection => "invalid_section",
            AppError::InvalidFilters(_) => "invalid_filters",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::NotFound => "not_found",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::StoreTimeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::MissingAuthHeaders
            | AppError::InvalidTimestamp
            | AppError::InvalidKey
            | AppError::InvalidSignature
            | AppError::NonceReused => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::IdempotencyConflict | AppError::IdempotencyInProgress => {
                StatusCode::CONFLICT
            }
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InvalidCursor
            | AppError::InvalidPayload(_)
            | AppError::QueryTooShort
            | AppError::QueryTooLong
            | AppError::InvalidSection
            | AppError::InvalidFilters(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether the same request may succeed if resubmitted unchanged.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Serialization(_)
                | AppError::Internal(_)
                | AppError::StoreTimeout
                | AppError::IdempotencyInProgress
        )
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "nonce_reused",
///     "message": "nonce has already been used",
///     "retryable": false,
///     "requestId": "3f2c7d9e-..."
///   }
/// }
/// ```
///
/// Server-side failures are logged with their details; the client only sees
/// a generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = request_id::current_request_id();

        if self.status().is_server_error() {
            tracing::error!(
                error = %self,
                request_id = request_id.as_deref().unwrap_or("-"),
                "request failed"
            );
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.client_message(),
                "retryable": self.retryable(),
                "requestId": request_id,
            }
        }));

        (self.status(), body).into_response()
    }
}
