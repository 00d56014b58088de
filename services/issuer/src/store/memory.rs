//! In-memory implementations of the issuer stores.
//!
//! # Purpose
//! Process-local stand-ins for KMS and S3 used by local development and the
//! test suite. `InMemoryKeyStore` generates real RSA-2048 keys and produces
//! real PKCS#1 v1.5 / SHA-256 signatures, so tokens it signs verify against the
//! JWKS built from its public keys exactly as they would against KMS.
//!
//! # Durability and consistency
//! - **Not durable**: all keys, aliases and artifacts are lost on restart.
//! - **Single-process consistency**: maps are guarded by `tokio::sync::RwLock`;
//!   mutations take write locks and are therefore atomic per call.
//! - **No multi-node coordination**: every process has its own key ring.
use super::{ArtifactStore, KeyId, KeyStore, LeaseStore, StoreError, StoreResult};
use anyhow::anyhow;
use async_trait::async_trait;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const RSA_BITS: usize = 2048;

struct KeyEntry {
    signing_key: SigningKey<Sha256>,
    public_der: Vec<u8>,
    tags: HashMap<String, String>,
    pending_deletion: bool,
}

/// In-memory key store with alias indirection.
#[derive(Default)]
pub struct InMemoryKeyStore {
    keys: Arc<RwLock<HashMap<KeyId, KeyEntry>>>,
    aliases: Arc<RwLock<HashMap<String, KeyId>>>,
    next_id: AtomicU64,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key ids that have been scheduled for deletion, in no particular order.
    pub async fn scheduled_deletions(&self) -> Vec<KeyId> {
        let keys = self.keys.read().await;
        keys.iter()
            .filter(|(_, entry)| entry.pending_deletion)
            .map(|(key_id, _)| key_id.clone())
            .collect()
    }

    /// Number of keys ever created, including those pending deletion.
    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }

    async fn resolve(&self, alias_or_key: &str) -> Option<KeyId> {
        if let Some(key_id) = self.aliases.read().await.get(alias_or_key) {
            return Some(key_id.clone());
        }
        let keys = self.keys.read().await;
        keys.contains_key(alias_or_key)
            .then(|| alias_or_key.to_string())
    }

    async fn ensure_key(&self, key_id: &str) -> StoreResult<()> {
        if self.keys.read().await.contains_key(key_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("key {key_id}")))
        }
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn create_key(&self) -> StoreResult<KeyId> {
        // Generation is CPU bound; keep it off the async worker threads.
        let private = tokio::task::spawn_blocking(|| {
            RsaPrivateKey::new(&mut rand::thread_rng(), RSA_BITS)
        })
        .await
        .map_err(|err| anyhow!("key generation task failed: {err}"))?
        .map_err(|err| anyhow!("generate rsa key: {err}"))?;
        let public_der = RsaPublicKey::from(&private)
            .to_public_key_der()
            .map_err(|err| anyhow!("encode public key: {err}"))?
            .as_bytes()
            .to_vec();

        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let key_id = format!("mem-key-{seq:04}-{:08x}", rand::random::<u32>());
        self.keys.write().await.insert(
            key_id.clone(),
            KeyEntry {
                signing_key: SigningKey::<Sha256>::new(private),
                public_der,
                tags: HashMap::new(),
                pending_deletion: false,
            },
        );
        Ok(key_id)
    }

    async fn describe_key(&self, alias_or_key: &str) -> StoreResult<Option<KeyId>> {
        Ok(self.resolve(alias_or_key).await)
    }

    async fn get_public_key(&self, alias_or_key: &str) -> StoreResult<Vec<u8>> {
        let key_id = self
            .resolve(alias_or_key)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("key {alias_or_key}")))?;
        let keys = self.keys.read().await;
        keys.get(&key_id)
            .map(|entry| entry.public_der.clone())
            .ok_or_else(|| StoreError::NotFound(format!("key {key_id}")))
    }

    async fn list_tags(&self, key_id: &str) -> StoreResult<HashMap<String, String>> {
        let keys = self.keys.read().await;
        keys.get(key_id)
            .map(|entry| entry.tags.clone())
            .ok_or_else(|| StoreError::NotFound(format!("key {key_id}")))
    }

    async fn tag_key(&self, key_id: &str, tag: &str, value: &str) -> StoreResult<()> {
        let mut keys = self.keys.write().await;
        let entry = keys
            .get_mut(key_id)
            .ok_or_else(|| StoreError::NotFound(format!("key {key_id}")))?;
        entry.tags.insert(tag.to_string(), value.to_string());
        Ok(())
    }

    async fn create_alias(&self, alias: &str, key_id: &str) -> StoreResult<()> {
        self.ensure_key(key_id).await?;
        let mut aliases = self.aliases.write().await;
        if aliases.contains_key(alias) {
            return Err(StoreError::Conflict(format!("alias {alias} already exists")));
        }
        aliases.insert(alias.to_string(), key_id.to_string());
        Ok(())
    }

    async fn update_alias(&self, alias: &str, key_id: &str) -> StoreResult<()> {
        self.ensure_key(key_id).await?;
        let mut aliases = self.aliases.write().await;
        match aliases.get_mut(alias) {
            Some(target) => {
                *target = key_id.to_string();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("alias {alias}"))),
        }
    }

    async fn schedule_key_deletion(&self, key_id: &str) -> StoreResult<()> {
        let mut keys = self.keys.write().await;
        let entry = keys
            .get_mut(key_id)
            .ok_or_else(|| StoreError::NotFound(format!("key {key_id}")))?;
        entry.pending_deletion = true;
        Ok(())
    }

    async fn sign(&self, key_id: &str, message: &[u8]) -> StoreResult<Vec<u8>> {
        let keys = self.keys.read().await;
        let entry = keys
            .get(key_id)
            .ok_or_else(|| StoreError::NotFound(format!("key {key_id}")))?;
        if entry.pending_deletion {
            return Err(StoreError::Unexpected(anyhow!(
                "key {key_id} is pending deletion"
            )));
        }
        Ok(entry.signing_key.sign(message).to_vec())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// In-memory artifact store keyed by object path.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put_json(&self, key: &str, body: Vec<u8>) -> StoreResult<()> {
        self.objects.write().await.insert(key.to_string(), body);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.objects.read().await.get(key).cloned())
    }
}

struct Lease {
    holder: String,
    expires_at: Instant,
}

/// Process-local lease table.
#[derive(Default)]
pub struct InMemoryLeaseStore {
    leases: Arc<RwLock<HashMap<String, Lease>>>,
    runs: Arc<RwLock<HashMap<String, u64>>>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn holder(&self, name: &str) -> Option<String> {
        let leases = self.leases.read().await;
        leases
            .get(name)
            .filter(|lease| lease.expires_at > Instant::now())
            .map(|lease| lease.holder.clone())
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut leases = self.leases.write().await;
        let held_by_other = leases
            .get(name)
            .is_some_and(|lease| lease.holder != holder && lease.expires_at > now);
        if held_by_other {
            return Ok(false);
        }
        leases.insert(
            name.to_string(),
            Lease {
                holder: holder.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, name: &str, holder: &str) -> StoreResult<()> {
        let mut leases = self.leases.write().await;
        if leases.get(name).is_some_and(|lease| lease.holder == holder) {
            leases.remove(name);
        }
        Ok(())
    }

    async fn last_run(&self, name: &str) -> StoreResult<Option<u64>> {
        Ok(self.runs.read().await.get(name).copied())
    }

    async fn record_run(&self, name: &str, at: u64) -> StoreResult<()> {
        self.runs.write().await.insert(name.to_string(), at);
        Ok(())
    }
}
