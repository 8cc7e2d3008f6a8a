//! Shared application state handed to every handler and middleware.

use std::sync::Arc;

use crate::config::AuthSettings;
use crate::middleware::auth::Authenticator;
use crate::services::idempotency::IdempotencyCoordinator;
use crate::services::nonce_ledger::NonceLedger;
use crate::store::{ApiKeyStore, HealthCheck, PostStore, SearchStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
    pub idempotency: Arc<IdempotencyCoordinator>,
    pub nonces: Arc<NonceLedger>,
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub posts: Arc<dyn PostStore>,
    pub search: Arc<dyn SearchStore>,
    pub health: Arc<dyn HealthCheck>,
    pub settings: AuthSettings,
}

impl AppState {
    /// Wire every component to one backing store.
    pub fn new<S: Store + 'static>(store: Arc<S>, settings: AuthSettings) -> Self {
        let nonces = Arc::new(NonceLedger::new(
            store.clone(),
            settings.nonce_ttl,
            settings.store_timeout,
        ));
        let authenticator = Arc::new(Authenticator::new(
            store.clone(),
            nonces.clone(),
            settings,
        ));
        let idempotency = Arc::new(IdempotencyCoordinator::new(
            store.clone(),
            settings.store_timeout,
        ));

        Self {
            authenticator,
            idempotency,
            nonces,
            api_keys: store.clone(),
            posts: store.clone(),
            search: store.clone(),
            health: store,
            settings,
        }
    }
}
