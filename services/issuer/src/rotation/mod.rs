//! Signing-key rotation engine.
//!
//! # Purpose
//! Advances the three-slot key ring (PREVIOUS <- CURRENT <- PENDING <- new) and
//! republishes the JWKS and OpenID discovery document. Each step is a separate
//! invocation; [`workflow::RotationWorkflow`] drives them in order.
//!
//! # Key invariants
//! - The old PREVIOUS key is scheduled for deletion before the PREVIOUS alias
//!   is repointed, so no alias ever references a key after its deletion step.
//! - Alias state is re-read from the key store on every step; nothing is
//!   cached between invocations.
//! - Steps that find their source alias unbound are no-ops, which lets the
//!   first cycles run against an empty ring.
//! - Failures are never rolled back. A failed cycle is repaired by the next
//!   successful one.
//!
//! # Concurrency
//! Steps must not interleave with another cycle's steps. The workflow takes a
//! lease before running; calling [`KeyRotator::run_step`] directly bypasses it.
pub mod notify;
pub mod scheduler;
pub mod workflow;

use crate::config::KeyAliases;
use crate::store::{ArtifactStore, JWK_KID_TAG, KeyId, KeyStore, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use sts_jose::{JWKS_PATH, JoseError, Jwk, Jwks, OPENID_CONFIGURATION_PATH, OpenIdConfiguration};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RotationStep {
    DeletePrevious,
    MovePrevious,
    MoveCurrent,
    CreatePending,
    GenerateArtifacts,
}

impl RotationStep {
    /// Execution order within one rotation cycle.
    pub const CYCLE: [RotationStep; 5] = [
        RotationStep::DeletePrevious,
        RotationStep::MovePrevious,
        RotationStep::MoveCurrent,
        RotationStep::CreatePending,
        RotationStep::GenerateArtifacts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RotationStep::DeletePrevious => "deletePrevious",
            RotationStep::MovePrevious => "movePrevious",
            RotationStep::MoveCurrent => "moveCurrent",
            RotationStep::CreatePending => "createPending",
            RotationStep::GenerateArtifacts => "generateArtifacts",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::CYCLE.into_iter().find(|step| step.as_str() == name)
    }
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("key store: {0}")]
    Store(#[from] StoreError),
    #[error("jwk: {0}")]
    Jwk(#[from] JoseError),
    #[error("serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Alias bindings observed at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRing {
    pub previous: Option<KeyId>,
    pub current: Option<KeyId>,
    pub pending: Option<KeyId>,
}

impl KeyRing {
    /// True when all three aliases are bound to three different keys.
    pub fn is_fully_distinct(&self) -> bool {
        match (&self.previous, &self.current, &self.pending) {
            (Some(previous), Some(current), Some(pending)) => {
                previous != current && current != pending && previous != pending
            }
            _ => false,
        }
    }
}

/// Executes individual rotation steps against the key and artifact stores.
#[derive(Clone)]
pub struct KeyRotator {
    keys: Arc<dyn KeyStore>,
    artifacts: Arc<dyn ArtifactStore>,
    aliases: KeyAliases,
    issuer: String,
}

impl KeyRotator {
    pub fn new(
        keys: Arc<dyn KeyStore>,
        artifacts: Arc<dyn ArtifactStore>,
        aliases: KeyAliases,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            keys,
            artifacts,
            aliases,
            issuer: issuer.into(),
        }
    }

    pub fn aliases(&self) -> &KeyAliases {
        &self.aliases
    }

    /// Run the step named by an invocation event. Unknown names are logged and
    /// ignored so that malformed input never fails a running workflow.
    pub async fn handle(&self, step_name: &str) -> Result<Option<RotationStep>, RotationError> {
        let Some(step) = RotationStep::parse(step_name) else {
            tracing::warn!(step = %step_name, "invalid rotation step; ignoring");
            metrics::counter!("sts_rotation_steps_total", "step" => "unknown", "outcome" => "ignored")
                .increment(1);
            return Ok(None);
        };
        self.run_step(step).await?;
        Ok(Some(step))
    }

    pub async fn run_step(&self, step: RotationStep) -> Result<(), RotationError> {
        let result = match step {
            RotationStep::DeletePrevious => self.delete_previous().await,
            RotationStep::MovePrevious => self.move_previous().await,
            RotationStep::MoveCurrent => self.move_current().await,
            RotationStep::CreatePending => self.create_pending().await,
            RotationStep::GenerateArtifacts => self.generate_artifacts().await.map(|_| ()),
        };
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            "sts_rotation_steps_total",
            "step" => step.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        if let Err(err) = &result {
            tracing::error!(%step, error = %err, "rotation step failed");
        }
        result
    }

    /// Current alias bindings.
    pub async fn ring(&self) -> StoreResult<KeyRing> {
        Ok(KeyRing {
            previous: self.key_id_for_alias(&self.aliases.previous).await?,
            current: self.key_id_for_alias(&self.aliases.current).await?,
            pending: self.key_id_for_alias(&self.aliases.pending).await?,
        })
    }

    async fn delete_previous(&self) -> Result<(), RotationError> {
        match self.key_id_for_alias(&self.aliases.previous).await? {
            Some(key_id) => {
                self.keys.schedule_key_deletion(&key_id).await?;
                tracing::info!(key_id = %key_id, alias = %self.aliases.previous, "scheduled previous key for deletion");
            }
            None => tracing::info!("no previous key bound; skipping deletion"),
        }
        Ok(())
    }

    async fn move_previous(&self) -> Result<(), RotationError> {
        match self.key_id_for_alias(&self.aliases.current).await? {
            Some(key_id) => self.update_or_create_alias(&self.aliases.previous, &key_id).await?,
            None => tracing::info!("no current key bound; leaving previous alias untouched"),
        }
        Ok(())
    }

    async fn move_current(&self) -> Result<(), RotationError> {
        match self.key_id_for_alias(&self.aliases.pending).await? {
            Some(key_id) => self.update_or_create_alias(&self.aliases.current, &key_id).await?,
            None => tracing::info!("no pending key bound; leaving current alias untouched"),
        }
        Ok(())
    }

    async fn create_pending(&self) -> Result<(), RotationError> {
        let key_id = self.keys.create_key().await?;
        tracing::info!(key_id = %key_id, "created pending signing key");
        self.update_or_create_alias(&self.aliases.pending, &key_id)
            .await?;
        Ok(())
    }

    /// Tag every bound key with its `kid` and publish the JWKS (ordered
    /// PREVIOUS, CURRENT, PENDING) and the discovery document.
    pub async fn generate_artifacts(&self) -> Result<Jwks, RotationError> {
        let mut jwks = Jwks::default();
        for alias in [
            &self.aliases.previous,
            &self.aliases.current,
            &self.aliases.pending,
        ] {
            let Some(key_id) = self.key_id_for_alias(alias).await? else {
                continue;
            };
            let der = self.keys.get_public_key(&key_id).await?;
            let jwk = Jwk::from_public_key_der(&der)?;
            self.keys.tag_key(&key_id, JWK_KID_TAG, &jwk.kid).await?;
            tracing::debug!(alias = %alias, key_id = %key_id, kid = %jwk.kid, "tagged key");
            jwks.keys.push(jwk);
        }

        self.artifacts
            .put_json(JWKS_PATH, serde_json::to_vec(&jwks)?)
            .await?;
        let discovery = OpenIdConfiguration::for_issuer(&self.issuer);
        self.artifacts
            .put_json(OPENID_CONFIGURATION_PATH, serde_json::to_vec(&discovery)?)
            .await?;

        metrics::gauge!("sts_jwks_keys").set(jwks.keys.len() as f64);
        tracing::info!(keys = jwks.keys.len(), "published jwks and openid configuration");
        Ok(jwks)
    }

    async fn key_id_for_alias(&self, alias: &str) -> StoreResult<Option<KeyId>> {
        self.keys.describe_key(alias).await
    }

    async fn update_or_create_alias(&self, alias: &str, key_id: &str) -> StoreResult<()> {
        match self.keys.update_alias(alias, key_id).await {
            Ok(()) => {
                tracing::info!(alias = %alias, key_id = %key_id, "alias moved");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                tracing::info!(alias = %alias, key_id = %key_id, "alias not found; creating it");
                self.keys.create_alias(alias, key_id).await
            }
            Err(err) => Err(err),
        }
    }
}
