//! Idempotency record model.
//!
//! One row per client-supplied `Idempotency-Key`. The request hash is fixed
//! at creation; the status moves from `in_progress` to `completed` once, when
//! the stored response is written.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
}

impl IdempotencyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IdempotencyStatus::InProgress => "in_progress",
            IdempotencyStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in_progress" => Some(IdempotencyStatus::InProgress),
            "completed" => Some(IdempotencyStatus::Completed),
            _ => None,
        }
    }
}

/// Represents an idempotency record from the database.
///
/// # Database Table
///
/// Maps to the `idempotency_keys` table. `response` is only present once
/// `status` is completed.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub key: String,

    /// SHA-256 hex of the canonical request payload
    pub request_hash: String,

    pub status: IdempotencyStatus,

    pub response: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
