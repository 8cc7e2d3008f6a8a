//! Idempotency coordinator for mutating endpoints.
//!
//! A client-supplied `Idempotency-Key` binds one logical write to one stored
//! response. The first request to insert the key owns the execution; later
//! requests either replay the stored response, see the write still in
//! progress, or are rejected because the key was reused for another payload.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::models::idempotency::IdempotencyStatus;
use crate::services::signature::sha256_hex;
use crate::store::{IdempotencyStore, with_deadline};

/// Header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Result of [`IdempotencyCoordinator::begin`].
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// This caller created the record and must execute, then finalize.
    Owned,
    /// The write already completed; return this response verbatim.
    Replay(Value),
}

pub struct IdempotencyCoordinator {
    store: Arc<dyn IdempotencyStore>,
    deadline: Duration,
}

impl IdempotencyCoordinator {
    pub fn new(store: Arc<dyn IdempotencyStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// Claim `key` for `request_hash` or resolve what an earlier claim left.
    ///
    /// # Process
    ///
    /// 1. Try to insert an `in_progress` record; success means ownership
    /// 2. Otherwise read the existing record
    /// 3. Different hash: conflict. Completed: replay. Else: in progress
    ///
    /// Never waits for a concurrent owner.
    ///
    /// # Errors
    ///
    /// - `IdempotencyConflict`: key already used with another payload
    /// - `IdempotencyInProgress`: the owning request has not finalized
    pub async fn begin(&self, key: &str, request_hash: &str) -> Result<BeginOutcome, AppError> {
        if with_deadline(self.deadline, self.store.insert_in_progress(key, request_hash)).await? {
            return Ok(BeginOutcome::Owned);
        }

        // Lost the insert race but the row is gone again: treat as still running.
        let Some(record) = with_deadline(self.deadline, self.store.find(key)).await? else {
            return Err(AppError::IdempotencyInProgress);
        };

        if record.request_hash != request_hash {
            return Err(AppError::IdempotencyConflict);
        }

        match (record.status, record.response) {
            (IdempotencyStatus::Completed, Some(response)) => Ok(BeginOutcome::Replay(response)),
            _ => Err(AppError::IdempotencyInProgress),
        }
    }

    /// Store the response of an owned execution and mark the record completed.
    pub async fn finalize(
        &self,
        key: &str,
        request_hash: &str,
        response: &Value,
    ) -> Result<(), AppError> {
        let updated = with_deadline(
            self.deadline,
            self.store.mark_completed(key, request_hash, response),
        )
        .await?;
        if !updated {
            tracing::warn!(
                idempotency_key = key,
                "no in-progress record to finalize"
            );
        }
        Ok(())
    }

    /// Execute `execute` at most once per idempotency key.
    ///
    /// A missing or blank `key` bypasses coordination entirely. Otherwise the
    /// payload is hashed, the key is claimed, and the serialized result is
    /// stored for replay.
    ///
    /// A failed execution leaves the record `in_progress`; retries with the
    /// same key see [`AppError::IdempotencyInProgress`] until the claim is
    /// released by [`IdempotencyCoordinator::release_stale_claims`].
    pub async fn run<P, T, F, Fut>(
        &self,
        key: Option<&str>,
        payload: &P,
        execute: F,
    ) -> Result<Value, AppError>
    where
        P: Serialize + ?Sized,
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return Ok(serde_json::to_value(execute().await?)?);
        };

        let request_hash = request_hash(payload)?;
        match self.begin(key, &request_hash).await? {
            BeginOutcome::Replay(response) => {
                tracing::debug!(idempotency_key = key, "replaying stored response");
                Ok(response)
            }
            BeginOutcome::Owned => {
                let result = match execute().await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::warn!(
                            idempotency_key = key,
                            error = %err,
                            "idempotent operation failed, record left in progress"
                        );
                        return Err(err);
                    }
                };
                let response = serde_json::to_value(result)?;
                self.finalize(key, &request_hash, &response).await?;
                Ok(response)
            }
        }
    }

    /// Delete completed records older than `retention`. In-progress records are kept.
    pub async fn purge_completed_older_than(&self, retention: Duration) -> Result<u64, AppError> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| AppError::Internal(format!("retention out of range: {e}")))?;
        let cutoff = chrono::Utc::now() - retention;
        with_deadline(self.deadline, self.store.purge_completed_before(cutoff)).await
    }

    /// Delete `in_progress` records older than `stale_after` so the key can be
    /// claimed again. `stale_after` must exceed the longest owned execution.
    pub async fn release_stale_claims(&self, stale_after: Duration) -> Result<u64, AppError> {
        let stale_after = chrono::Duration::from_std(stale_after)
            .map_err(|e| AppError::Internal(format!("stale age out of range: {e}")))?;
        let cutoff = chrono::Utc::now() - stale_after;
        with_deadline(self.deadline, self.store.release_in_progress_before(cutoff)).await
    }
}

/// SHA-256 hex of the canonical JSON form of `payload`.
///
/// Going through `serde_json::Value` sorts object keys recursively, and
/// compact serialization drops whitespace, so field order in the client's
/// body never changes the hash.
pub fn request_hash<P: Serialize + ?Sized>(payload: &P) -> Result<String, AppError> {
    let canonical = serde_json::to_vec(&serde_json::to_value(payload)?)?;
    Ok(sha256_hex(&canonical))
}

/// Purge completed idempotency records every hour.
pub fn spawn_idempotency_purger(
    coordinator: Arc<IdempotencyCoordinator>,
    retention: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match coordinator.purge_completed_older_than(retention).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "purged completed idempotency records"),
                Err(err) => tracing::warn!(error = %err, "idempotency purge failed"),
            }
        }
    })
}

/// Release abandoned idempotency claims, checking once a minute or every
/// `stale_after` when that is shorter.
pub fn spawn_stale_claim_releaser(
    coordinator: Arc<IdempotencyCoordinator>,
    stale_after: Duration,
) -> tokio::task::JoinHandle<()> {
    let period = stale_after.clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match coordinator.release_stale_claims(stale_after).await {
                Ok(0) => {}
                Ok(released) => tracing::warn!(released, "released stale idempotency claims"),
                Err(err) => tracing::warn!(error = %err, "stale claim release failed"),
            }
        }
    })
}
