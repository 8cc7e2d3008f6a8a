//! API key lifecycle: issuance, listing, rotation and revocation.
//!
//! Keys are never deleted. Revocation sets a timestamp that makes every
//! later authentication fail with `invalid_key`; rotation replaces the
//! secret and clears revocation.

use std::time::Duration;

use crate::error::AppError;
use crate::models::api_key::{
    ApiKeySummary, DEFAULT_SCOPE, IssuedKeyResponse, NewApiKey, RevokedKeyResponse,
    RotatedKeyResponse,
};
use crate::store::{ApiKeyStore, with_deadline};

const DEFAULT_KEY_NAME: &str = "tdp-key";
const KEY_ID_PREFIX: &str = "k_";

/// Issue a new key.
///
/// # Process
///
/// 1. Trim the name, defaulting to `tdp-key`
/// 2. Generate `k_` + 12 hex characters as the public id
/// 3. Generate a 48 hex character secret
/// 4. Normalize scopes and insert
///
/// # Returns
///
/// The stored key summary plus the secret. The secret is not retrievable later.
pub async fn issue_key(
    store: &dyn ApiKeyStore,
    deadline: Duration,
    name: &str,
    scopes: &[String],
) -> Result<IssuedKeyResponse, AppError> {
    let name = match name.trim() {
        "" => DEFAULT_KEY_NAME.to_string(),
        trimmed => trimmed.to_string(),
    };
    let secret = generate_secret();
    let new_key = NewApiKey {
        key_id: generate_key_id(),
        name,
        secret: secret.clone(),
        scopes: normalize_scopes(scopes),
    };

    let key = with_deadline(deadline, store.create_key(new_key)).await?;
    tracing::info!(key_id = %key.key_id, scopes = ?key.scopes, "api key issued");

    Ok(IssuedKeyResponse {
        item: key.into(),
        secret,
    })
}

/// All keys, newest first, without secrets.
pub async fn list_keys(
    store: &dyn ApiKeyStore,
    deadline: Duration,
) -> Result<Vec<ApiKeySummary>, AppError> {
    let keys = with_deadline(deadline, store.list_keys()).await?;
    Ok(keys.into_iter().map(ApiKeySummary::from).collect())
}

/// Replace the secret of `key_id` and clear any revocation.
///
/// # Errors
///
/// - `NotFound`: no key with this id
pub async fn rotate_key(
    store: &dyn ApiKeyStore,
    deadline: Duration,
    key_id: &str,
) -> Result<RotatedKeyResponse, AppError> {
    let secret = generate_secret();
    if !with_deadline(deadline, store.rotate_key(key_id, &secret)).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(key_id, "api key rotated");

    Ok(RotatedKeyResponse {
        key_id: key_id.to_string(),
        secret,
    })
}

/// Revoke `key_id`. Revoking twice is not an error.
///
/// # Errors
///
/// - `NotFound`: no key with this id
pub async fn revoke_key(
    store: &dyn ApiKeyStore,
    deadline: Duration,
    key_id: &str,
) -> Result<RevokedKeyResponse, AppError> {
    if !with_deadline(deadline, store.revoke_key(key_id)).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(key_id, "api key revoked");

    Ok(RevokedKeyResponse {
        ok: true,
        key_id: key_id.to_string(),
    })
}

/// Trim, drop blanks and duplicates (first occurrence wins), default to
/// `content:read` when nothing is left.
pub fn normalize_scopes(input: &[String]) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::with_capacity(input.len());
    for scope in input.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !scopes.iter().any(|existing| existing == scope) {
            scopes.push(scope.to_string());
        }
    }
    if scopes.is_empty() {
        scopes.push(DEFAULT_SCOPE.to_string());
    }
    scopes
}

fn generate_key_id() -> String {
    format!("{KEY_ID_PREFIX}{}", hex::encode(rand::random::<[u8; 6]>()))
}

fn generate_secret() -> String {
    hex::encode(rand::random::<[u8; 24]>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    const DEADLINE: Duration = Duration::from_secs(1);

    fn scopes(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scopes_are_trimmed_and_deduplicated() {
        assert_eq!(
            normalize_scopes(&scopes(&[" content:write ", "", "content:write", "keys:admin"])),
            scopes(&["content:write", "keys:admin"])
        );
        assert_eq!(normalize_scopes(&[]), scopes(&["content:read"]));
        assert_eq!(normalize_scopes(&scopes(&["  "])), scopes(&["content:read"]));
    }

    #[test]
    fn generated_material_has_expected_shape() {
        let key_id = generate_key_id();
        assert!(key_id.starts_with("k_"));
        assert_eq!(key_id.len(), 14);
        assert!(key_id[2..].chars().all(|c| c.is_ascii_hexdigit()));

        let secret = generate_secret();
        assert_eq!(secret.len(), 48);
        assert_ne!(secret, generate_secret());
    }

    #[tokio::test]
    async fn issued_keys_are_listed_without_secrets() {
        let store = MemoryStore::new();
        let issued = issue_key(&store, DEADLINE, "  ", &[]).await.unwrap();
        assert_eq!(issued.item.name, "tdp-key");
        assert_eq!(issued.item.scopes, scopes(&["content:read"]));

        let listed = list_keys(&store, DEADLINE).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key_id, issued.item.key_id);
        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains(&issued.secret));
    }

    #[tokio::test]
    async fn rotate_and_revoke_unknown_keys_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            rotate_key(&store, DEADLINE, "k_missing").await,
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            revoke_key(&store, DEADLINE, "k_missing").await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn rotation_replaces_secret_and_clears_revocation() {
        let store = MemoryStore::new();
        let issued = issue_key(&store, DEADLINE, "ops", &scopes(&["keys:admin"]))
            .await
            .unwrap();
        let key_id = issued.item.key_id.clone();

        revoke_key(&store, DEADLINE, &key_id).await.unwrap();
        assert!(store.find_by_key_id(&key_id).await.unwrap().unwrap().is_revoked());

        let rotated = rotate_key(&store, DEADLINE, &key_id).await.unwrap();
        assert_ne!(rotated.secret, issued.secret);
        let key = store.find_by_key_id(&key_id).await.unwrap().unwrap();
        assert!(!key.is_revoked());
        assert_eq!(key.secret, rotated.secret);
    }
}
