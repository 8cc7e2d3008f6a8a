//! Signed-request authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Check the four signing headers and the timestamp window
//! 2. Buffer and hash the body, then put it back for the handler
//! 3. Look up the key and verify the HMAC signature
//! 4. Register the nonce so the request cannot be replayed
//! 5. Inject authentication context into the request
//!
//! Any failure short-circuits with HTTP 401 and leaves no nonce behind,
//! except a replay, which is itself reported as `nonce_reused`.

use crate::{
    config::AuthSettings,
    error::AppError,
    models::api_key::WILDCARD_SCOPE,
    services::{
        nonce_ledger::NonceLedger,
        signature::{self, SignatureInput},
    },
    state::AppState,
    store::{ApiKeyStore, with_deadline},
};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const KEY_ID_HEADER: &str = "x-tdp-key-id";
pub const TIMESTAMP_HEADER: &str = "x-tdp-timestamp";
pub const NONCE_HEADER: &str = "x-tdp-nonce";
pub const SIGNATURE_HEADER: &str = "x-tdp-signature";

/// Authentication context attached to authenticated requests.
///
/// Inserted into the request's extension map; handlers extract it with
/// `Extension<AuthContext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Public identifier of the authenticated key
    pub key_id: String,

    /// Capabilities granted to the key
    pub scopes: Vec<String>,
}

impl AuthContext {
    /// Whether the key holds `scope`, directly or through `*`.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes
            .iter()
            .any(|granted| granted == WILDCARD_SCOPE || granted == scope)
    }
}

/// The four signing headers, trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub key_id: String,
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
}

/// Verifies signed requests against the key store and nonce ledger.
pub struct Authenticator {
    keys: Arc<dyn ApiKeyStore>,
    nonces: Arc<NonceLedger>,
    settings: AuthSettings,
}

impl Authenticator {
    pub fn new(keys: Arc<dyn ApiKeyStore>, nonces: Arc<NonceLedger>, settings: AuthSettings) -> Self {
        Self {
            keys,
            nonces,
            settings,
        }
    }

    /// Extract the signing headers and check the timestamp window.
    ///
    /// # Errors
    ///
    /// - `MissingAuthHeaders`: any header absent, non-UTF-8 or blank
    /// - `InvalidTimestamp`: not epoch milliseconds, or too far from `now`
    pub fn check_headers(
        &self,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<SignedHeaders, AppError> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(AppError::MissingAuthHeaders)
        };

        let signed = SignedHeaders {
            key_id: read(KEY_ID_HEADER)?,
            timestamp: read(TIMESTAMP_HEADER)?,
            nonce: read(NONCE_HEADER)?,
            signature: read(SIGNATURE_HEADER)?,
        };

        if !signature::validate_timestamp(&signed.timestamp, self.settings.max_skew, now) {
            return Err(AppError::InvalidTimestamp);
        }

        Ok(signed)
    }

    /// Authenticate a request whose headers passed [`Self::check_headers`].
    ///
    /// # Process
    ///
    /// 1. Load the key; unknown and revoked keys fail identically
    /// 2. Verify the signature in constant time
    /// 3. Register the nonce (only now, so failed attempts burn nothing)
    /// 4. Refresh `last_used_at`, logging rather than failing on error
    ///
    /// # Errors
    ///
    /// - `InvalidKey`, `InvalidSignature`, `NonceReused`
    /// - `StoreTimeout` / `Database` when the store cannot answer
    pub async fn verify(
        &self,
        signed: &SignedHeaders,
        method: &str,
        path: &str,
        raw_query: &str,
        body_hash: &str,
    ) -> Result<AuthContext, AppError> {
        let deadline = self.settings.store_timeout;

        let key = with_deadline(deadline, self.keys.find_by_key_id(&signed.key_id))
            .await?
            .filter(|key| !key.is_revoked())
            .ok_or(AppError::InvalidKey)?;

        let input = SignatureInput {
            method,
            path,
            raw_query,
            timestamp: &signed.timestamp,
            nonce: &signed.nonce,
            body_hash,
        };
        if !signature::verify(&key.secret, &input, &signed.signature) {
            tracing::debug!(key_id = %key.key_id, "signature mismatch");
            return Err(AppError::InvalidSignature);
        }

        self.nonces.register(&key.key_id, &signed.nonce).await?;

        if let Err(err) = with_deadline(deadline, self.keys.touch_last_used(&key.key_id)).await {
            tracing::warn!(key_id = %key.key_id, error = %err, "failed to update key last-used time");
        }

        Ok(AuthContext {
            key_id: key.key_id,
            scopes: key.scopes,
        })
    }
}

/// Signed-request authentication middleware function.
///
/// # Flow
///
/// 1. Validate the `X-TDP-*` headers and timestamp
/// 2. Reject bodies above `MAX_BODY_BYTES` with 413
/// 3. Buffer the body, hash it, and rebuild the request with the same bytes
/// 4. Verify key, signature and nonce
/// 5. Insert `AuthContext` and call the next handler
///
/// # Headers
///
/// ```text
/// X-TDP-Key-Id: k_1a2b3c4d5e6f
/// X-TDP-Timestamp: 1700000000000
/// X-TDP-Nonce: 6f1c...
/// X-TDP-Signature: 697c84b2...
/// ```
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authenticator = &state.authenticator;
    let signed = authenticator.check_headers(request.headers(), Utc::now())?;

    let max_body = state.settings.max_body_bytes;
    let declared_len = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > max_body) {
        return Err(AppError::PayloadTooLarge(max_body));
    }

    let (parts, body) = request.into_parts();
    // Also fails when an undeclared (chunked) body runs past the limit
    let bytes = axum::body::to_bytes(body, max_body)
        .await
        .map_err(|_| AppError::PayloadTooLarge(max_body))?;
    let body_hash = signature::sha256_hex(&bytes);

    let context = authenticator
        .verify(
            &signed,
            parts.method.as_str(),
            parts.uri.path(),
            parts.uri.query().unwrap_or(""),
            &body_hash,
        )
        .await?;
    tracing::debug!(key_id = %context.key_id, "request authenticated");

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Scope a route group requires, used as middleware state.
#[derive(Debug, Clone, Copy)]
pub struct RequiredScope(pub &'static str);

/// Reject authenticated requests whose key lacks the route's scope.
///
/// Must run inside [`auth_middleware`]; a request without `AuthContext` is
/// treated as unauthenticated.
pub async fn require_scope(
    State(RequiredScope(scope)): State<RequiredScope>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let context = request
        .extensions()
        .get::<AuthContext>()
        .ok_or(AppError::MissingAuthHeaders)?;

    if !context.has_scope(scope) {
        tracing::info!(key_id = %context.key_id, scope, "missing scope");
        return Err(AppError::Forbidden(scope.to_string()));
    }

    Ok(next.run(request).await)
}
