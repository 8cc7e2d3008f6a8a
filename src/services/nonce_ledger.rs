//! Replay protection: each `(key_id, nonce)` pair is accepted once per TTL.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::store::{NonceStore, with_deadline};

/// Records used nonces in the shared store.
///
/// The ledger keeps no state of its own; uniqueness is the store's
/// insert-if-absent, so any number of server instances can share it.
pub struct NonceLedger {
    store: Arc<dyn NonceStore>,
    ttl: Duration,
    deadline: Duration,
}

impl NonceLedger {
    pub fn new(store: Arc<dyn NonceStore>, ttl: Duration, deadline: Duration) -> Self {
        Self {
            store,
            ttl,
            deadline,
        }
    }

    /// Register a nonce for `key_id` at the current time.
    pub async fn register(&self, key_id: &str, nonce: &str) -> Result<(), AppError> {
        self.register_at(key_id, nonce, Utc::now()).await
    }

    /// Register a nonce as of `now`.
    ///
    /// # Process
    ///
    /// 1. Insert `(key_id, nonce, now + ttl)` unless the pair exists
    /// 2. On collision return [`AppError::NonceReused`] without retrying
    /// 3. On success sweep expired rows; sweep failures are only logged
    ///
    /// # Errors
    ///
    /// - `NonceReused`: the pair is already recorded
    /// - `StoreTimeout` / `Database`: the insert itself failed
    pub async fn register_at(
        &self,
        key_id: &str,
        nonce: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| AppError::Internal(format!("nonce ttl out of range: {e}")))?;

        let inserted = with_deadline(
            self.deadline,
            self.store.insert_if_absent(key_id, nonce, now + ttl),
        )
        .await?;
        if !inserted {
            return Err(AppError::NonceReused);
        }

        match with_deadline(self.deadline, self.store.delete_expired(now)).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "swept expired nonces"),
            Err(err) => tracing::warn!(error = %err, "nonce sweep failed"),
        }

        Ok(())
    }

    /// Delete expired entries. Used by the background sweeper.
    pub async fn sweep(&self) -> Result<u64, AppError> {
        with_deadline(self.deadline, self.store.delete_expired(Utc::now())).await
    }
}

/// Run [`NonceLedger::sweep`] every `interval` until the runtime shuts down.
pub fn spawn_nonce_sweeper(
    ledger: Arc<NonceLedger>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match ledger.sweep().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "nonce sweeper removed expired entries"),
                Err(err) => tracing::warn!(error = %err, "nonce sweeper failed"),
            }
        }
    })
}
