//! Storage seams for the issuer.
//!
//! # Purpose
//! Defines the three external collaborators the issuer depends on:
//! - [`KeyStore`]: asymmetric signing keys addressed by mutable aliases.
//! - [`ArtifactStore`]: public JSON documents (JWKS, discovery).
//! - [`LeaseStore`]: a named, expiring lease used to serialize rotation cycles.
//!
//! # Key invariants
//! - `StoreError::NotFound` is only returned for a missing alias, key or lease
//!   and is what callers branch on; every other failure is `Unexpected`.
//! - Alias repoints and tag writes are atomic at the backing store. No caching
//!   happens behind these traits, so callers always observe fresh alias state.
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub mod aws;
pub mod memory;

/// Opaque, store-assigned key identifier.
pub type KeyId = String;

/// Tag holding the JWK `kid` derived from a key's public material.
pub const JWK_KID_TAG: &str = "jwk_kid";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Create an RSA-2048 sign/verify key and return its id.
    async fn create_key(&self) -> StoreResult<KeyId>;
    /// Resolve an alias (or key id) to a key id; `None` when nothing is bound.
    async fn describe_key(&self, alias_or_key: &str) -> StoreResult<Option<KeyId>>;
    /// DER-encoded `SubjectPublicKeyInfo` of a key (alias or key id).
    async fn get_public_key(&self, alias_or_key: &str) -> StoreResult<Vec<u8>>;
    async fn list_tags(&self, key_id: &str) -> StoreResult<HashMap<String, String>>;
    async fn tag_key(&self, key_id: &str, tag: &str, value: &str) -> StoreResult<()>;
    async fn create_alias(&self, alias: &str, key_id: &str) -> StoreResult<()>;
    /// Repoint an existing alias. Returns `StoreError::NotFound` if the alias
    /// does not exist yet.
    async fn update_alias(&self, alias: &str, key_id: &str) -> StoreResult<()>;
    async fn schedule_key_deletion(&self, key_id: &str) -> StoreResult<()>;
    /// RSASSA-PKCS1-v1_5 / SHA-256 signature over the raw message bytes.
    async fn sign(&self, key_id: &str, message: &[u8]) -> StoreResult<Vec<u8>>;
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Replace the object at `key` with a JSON body.
    async fn put_json(&self, key: &str, body: Vec<u8>) -> StoreResult<()>;
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
}

#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Take the lease `name` for `holder` unless another holder owns an
    /// unexpired lease. Returns whether the lease is now held by `holder`.
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> StoreResult<bool>;
    /// Release the lease if `holder` still owns it.
    async fn release(&self, name: &str, holder: &str) -> StoreResult<()>;
    /// Unix time of the last run recorded under `name`, shared by every
    /// process using this store.
    async fn last_run(&self, name: &str) -> StoreResult<Option<u64>>;
    async fn record_run(&self, name: &str, at: u64) -> StoreResult<()>;
}

/// Look up the `jwk_kid` tag on a key.
pub async fn kid_for_key(store: &dyn KeyStore, key_id: &str) -> StoreResult<Option<String>> {
    let mut tags = store.list_tags(key_id).await?;
    Ok(tags.remove(JWK_KID_TAG))
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
