//! AWS-backed stores: KMS for signing keys, S3 for artifacts and leases.
//!
//! # Notes
//! - KMS `NotFoundException` maps to `StoreError::NotFound`; everything else is
//!   wrapped as `StoreError::Unexpected` with the SDK's full error context.
//! - Leases use S3 conditional writes (`If-None-Match: *` to create,
//!   `If-Match: <etag>` to take over an expired lease), so two processes can
//!   never both observe a successful acquire for the same unexpired lease.
use super::{ArtifactStore, KeyId, KeyStore, LeaseStore, StoreError, StoreResult, unix_now};
use anyhow::anyhow;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::{KeySpec, KeyUsageType, MessageType, SigningAlgorithmSpec, Tag};
use aws_sdk_s3::primitives::ByteStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const JSON_CONTENT_TYPE: &str = "application/json";
const KEY_DESCRIPTION: &str = "STS token signing key";
const LOCK_PREFIX: &str = "locks/";

/// Load the shared AWS configuration from the default provider chain.
pub async fn load_sdk_config() -> aws_config::SdkConfig {
    aws_config::load_defaults(BehaviorVersion::latest()).await
}

fn unexpected<E>(operation: &str, err: E) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StoreError::Unexpected(anyhow!("{operation}: {}", DisplayErrorContext(err)))
}

/// Key store backed by AWS KMS asymmetric keys and aliases.
#[derive(Clone)]
pub struct KmsKeyStore {
    client: aws_sdk_kms::Client,
}

impl KmsKeyStore {
    pub fn new(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }

    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(aws_sdk_kms::Client::new(config))
    }
}

#[async_trait]
impl KeyStore for KmsKeyStore {
    async fn create_key(&self) -> StoreResult<KeyId> {
        let output = self
            .client
            .create_key()
            .key_spec(KeySpec::Rsa2048)
            .key_usage(KeyUsageType::SignVerify)
            .description(KEY_DESCRIPTION)
            .send()
            .await
            .map_err(|err| unexpected("kms create_key", err))?;
        let metadata = output
            .key_metadata()
            .ok_or_else(|| anyhow!("kms create_key returned no key metadata"))?;
        Ok(metadata.key_id().to_string())
    }

    async fn describe_key(&self, alias_or_key: &str) -> StoreResult<Option<KeyId>> {
        match self.client.describe_key().key_id(alias_or_key).send().await {
            Ok(output) => Ok(output
                .key_metadata()
                .map(|metadata| metadata.key_id().to_string())),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(err) => Err(unexpected("kms describe_key", err)),
        }
    }

    async fn get_public_key(&self, alias_or_key: &str) -> StoreResult<Vec<u8>> {
        let output = self
            .client
            .get_public_key()
            .key_id(alias_or_key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_not_found_exception())
                {
                    StoreError::NotFound(format!("key {alias_or_key}"))
                } else {
                    unexpected("kms get_public_key", err)
                }
            })?;
        let public_key = output
            .public_key()
            .ok_or_else(|| anyhow!("kms get_public_key returned no key material"))?;
        Ok(public_key.as_ref().to_vec())
    }

    async fn list_tags(&self, key_id: &str) -> StoreResult<HashMap<String, String>> {
        let mut tags = HashMap::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .client
                .list_resource_tags()
                .key_id(key_id)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|err| unexpected("kms list_resource_tags", err))?;
            for tag in output.tags() {
                tags.insert(tag.tag_key().to_string(), tag.tag_value().to_string());
            }
            match output.next_marker() {
                Some(next) if output.truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(tags)
    }

    async fn tag_key(&self, key_id: &str, tag: &str, value: &str) -> StoreResult<()> {
        let tag = Tag::builder()
            .tag_key(tag)
            .tag_value(value)
            .build()
            .map_err(|err| anyhow!("build kms tag: {err}"))?;
        self.client
            .tag_resource()
            .key_id(key_id)
            .tags(tag)
            .send()
            .await
            .map_err(|err| unexpected("kms tag_resource", err))?;
        Ok(())
    }

    async fn create_alias(&self, alias: &str, key_id: &str) -> StoreResult<()> {
        self.client
            .create_alias()
            .alias_name(alias)
            .target_key_id(key_id)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_already_exists_exception())
                {
                    StoreError::Conflict(format!("alias {alias} already exists"))
                } else {
                    unexpected("kms create_alias", err)
                }
            })?;
        Ok(())
    }

    async fn update_alias(&self, alias: &str, key_id: &str) -> StoreResult<()> {
        self.client
            .update_alias()
            .alias_name(alias)
            .target_key_id(key_id)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_not_found_exception())
                {
                    StoreError::NotFound(format!("alias {alias}"))
                } else {
                    unexpected("kms update_alias", err)
                }
            })?;
        Ok(())
    }

    async fn schedule_key_deletion(&self, key_id: &str) -> StoreResult<()> {
        self.client
            .schedule_key_deletion()
            .key_id(key_id)
            .send()
            .await
            .map_err(|err| unexpected("kms schedule_key_deletion", err))?;
        Ok(())
    }

    async fn sign(&self, key_id: &str, message: &[u8]) -> StoreResult<Vec<u8>> {
        let output = self
            .client
            .sign()
            .key_id(key_id)
            .message(Blob::new(message))
            .message_type(MessageType::Raw)
            .signing_algorithm(SigningAlgorithmSpec::RsassaPkcs1V15Sha256)
            .send()
            .await
            .map_err(|err| unexpected("kms sign", err))?;
        let signature = output
            .signature()
            .ok_or_else(|| anyhow!("kms sign returned no signature"))?;
        Ok(signature.as_ref().to_vec())
    }

    fn backend_name(&self) -> &'static str {
        "kms"
    }
}

/// Artifact store writing public JSON documents into an S3 bucket.
#[derive(Clone)]
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ArtifactStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put_json(&self, key: &str, body: Vec<u8>) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(JSON_CONTENT_TYPE)
            .send()
            .await
            .map_err(|err| unexpected("s3 put_object", err))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        get_object(&self.client, &self.bucket, key)
            .await
            .map(|found| found.map(|(body, _)| body))
    }
}

async fn get_object(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
) -> StoreResult<Option<(Vec<u8>, Option<String>)>> {
    let output = match client.get_object().bucket(bucket).key(key).send().await {
        Ok(output) => output,
        Err(err)
            if err
                .as_service_error()
                .is_some_and(|service| service.is_no_such_key()) =>
        {
            return Ok(None);
        }
        Err(err) => return Err(unexpected("s3 get_object", err)),
    };
    let etag = output.e_tag().map(str::to_string);
    let body = output
        .body
        .collect()
        .await
        .map_err(|err| anyhow!("read s3 object body: {err}"))?
        .into_bytes()
        .to_vec();
    Ok(Some((body, etag)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LeaseRecord {
    holder: String,
    expires_at: u64,
}

impl LeaseRecord {
    fn blocks(&self, holder: &str, now: u64) -> bool {
        self.holder != holder && self.expires_at > now
    }
}

fn lease_key(name: &str) -> String {
    format!("{LOCK_PREFIX}{name}")
}

fn run_marker_key(name: &str) -> String {
    format!("{LOCK_PREFIX}{name}.last-run")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RunMarker {
    completed_at: u64,
}

/// Lease store persisted as small JSON objects under `locks/` in S3.
#[derive(Clone)]
pub struct S3LeaseStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3LeaseStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Conditional put; `Ok(false)` when the precondition does not hold.
    async fn put_lease(
        &self,
        key: &str,
        record: &LeaseRecord,
        if_match: Option<String>,
    ) -> StoreResult<bool> {
        let body = serde_json::to_vec(record).map_err(|err| anyhow!("encode lease: {err}"))?;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(JSON_CONTENT_TYPE);
        let request = match if_match {
            Some(etag) => request.if_match(etag),
            None => request.if_none_match("*"),
        };
        match request.send().await {
            Ok(_) => Ok(true),
            // 412 Precondition Failed, or 409 for a concurrent conditional write.
            Err(err)
                if err
                    .raw_response()
                    .is_some_and(|response| matches!(response.status().as_u16(), 409 | 412)) =>
            {
                Ok(false)
            }
            Err(err) => Err(unexpected("s3 put_object (lease)", err)),
        }
    }
}

#[async_trait]
impl LeaseStore for S3LeaseStore {
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> StoreResult<bool> {
        let key = lease_key(name);
        let now = unix_now();
        let record = LeaseRecord {
            holder: holder.to_string(),
            expires_at: now + ttl.as_secs(),
        };
        if self.put_lease(&key, &record, None).await? {
            return Ok(true);
        }

        let Some((body, etag)) = get_object(&self.client, &self.bucket, &key).await? else {
            // Released between our put and get; one more create attempt.
            return self.put_lease(&key, &record, None).await;
        };
        let blocked = match serde_json::from_slice::<LeaseRecord>(&body) {
            Ok(existing) => existing.blocks(holder, now),
            Err(err) => {
                tracing::warn!(lease = %key, error = %err, "unreadable lease record; taking over");
                false
            }
        };
        if blocked {
            return Ok(false);
        }
        let Some(etag) = etag else {
            return Err(StoreError::Conflict(format!(
                "lease {key} has no etag; refusing unconditional takeover"
            )));
        };
        self.put_lease(&key, &record, Some(etag)).await
    }

    async fn release(&self, name: &str, holder: &str) -> StoreResult<()> {
        let key = lease_key(name);
        let Some((body, _)) = get_object(&self.client, &self.bucket, &key).await? else {
            return Ok(());
        };
        let owned = serde_json::from_slice::<LeaseRecord>(&body)
            .map(|record| record.holder == holder)
            .unwrap_or(false);
        if owned {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|err| unexpected("s3 delete_object (lease)", err))?;
        }
        Ok(())
    }

    async fn last_run(&self, name: &str) -> StoreResult<Option<u64>> {
        let key = run_marker_key(name);
        let Some((body, _)) = get_object(&self.client, &self.bucket, &key).await? else {
            return Ok(None);
        };
        let marker = serde_json::from_slice::<RunMarker>(&body)
            .map_err(|err| anyhow!("decode run marker {key}: {err}"))?;
        Ok(Some(marker.completed_at))
    }

    async fn record_run(&self, name: &str, at: u64) -> StoreResult<()> {
        let body = serde_json::to_vec(&RunMarker { completed_at: at })
            .map_err(|err| anyhow!("encode run marker: {err}"))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(run_marker_key(name))
            .body(ByteStream::from(body))
            .content_type(JSON_CONTENT_TYPE)
            .send()
            .await
            .map_err(|err| unexpected("s3 put_object (run marker)", err))?;
        Ok(())
    }
}
