#![allow(dead_code)]

use std::sync::Arc;

use axum::{Router, body::Body, http::Request, response::Response};
use chrono::Utc;
use content_api_server::{
    config::AuthSettings,
    models::api_key::ApiKey,
    routes::build_router,
    services::signature::{SignatureInput, sha256_hex, sign},
    state::AppState,
    store::memory::MemoryStore,
};
use serde_json::Value;
use uuid::Uuid;

pub const KEY_ID: &str = "k_0123456789ab";
pub const SECRET: &str = "test-secret";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

/// Router over a fresh in-memory store with one key holding `scopes`.
pub fn test_app(scopes: &[&str]) -> TestApp {
    test_app_with(scopes, AuthSettings::default())
}

pub fn test_app_with(scopes: &[&str], settings: AuthSettings) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    seed_key(&store, KEY_ID, SECRET, scopes);
    let router = build_router(AppState::new(store.clone(), settings));
    TestApp { router, store }
}

pub fn seed_key(store: &MemoryStore, key_id: &str, secret: &str, scopes: &[&str]) {
    store.insert_api_key(ApiKey {
        id: Uuid::new_v4(),
        key_id: key_id.to_string(),
        name: "test".to_string(),
        secret: secret.to_string(),
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
        revoked_at: None,
        created_at: Utc::now(),
        last_used_at: None,
    });
}

/// Builder for a signed request; defaults to a fresh nonce and the current time.
pub struct Signed {
    pub method: &'static str,
    pub uri: String,
    pub body: String,
    pub key_id: String,
    pub secret: String,
    pub nonce: String,
    pub timestamp_ms: i64,
    pub extra_headers: Vec<(&'static str, String)>,
}

impl Signed {
    pub fn new(method: &'static str, uri: &str, body: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            body: body.to_string(),
            key_id: KEY_ID.to_string(),
            secret: SECRET.to_string(),
            nonce: Uuid::new_v4().to_string(),
            timestamp_ms: Utc::now().timestamp_millis(),
            extra_headers: Vec::new(),
        }
    }

    pub fn nonce(mut self, nonce: &str) -> Self {
        self.nonce = nonce.to_string();
        self
    }

    pub fn key(mut self, key_id: &str, secret: &str) -> Self {
        self.key_id = key_id.to_string();
        self.secret = secret.to_string();
        self
    }

    pub fn timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.extra_headers.push((name, value.to_string()));
        self
    }

    pub fn signature(&self) -> String {
        let (path, raw_query) = self.uri.split_once('?').unwrap_or((self.uri.as_str(), ""));
        let timestamp = self.timestamp_ms.to_string();
        let body_hash = sha256_hex(self.body.as_bytes());
        sign(
            &self.secret,
            &SignatureInput {
                method: self.method,
                path,
                raw_query,
                timestamp: &timestamp,
                nonce: &self.nonce,
                body_hash: &body_hash,
            },
        )
    }

    pub fn build(self) -> Request<Body> {
        let signature = self.signature();
        self.build_with_signature(&signature)
    }

    pub fn build_with_signature(self, signature: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(self.method)
            .uri(&self.uri)
            .header("content-type", "application/json")
            .header("X-TDP-Key-Id", &self.key_id)
            .header("X-TDP-Timestamp", self.timestamp_ms.to_string())
            .header("X-TDP-Nonce", &self.nonce)
            .header("X-TDP-Signature", signature);
        for (name, value) in &self.extra_headers {
            builder = builder.header(*name, value);
        }
        builder.body(Body::from(self.body)).unwrap()
    }
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}
