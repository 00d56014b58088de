//! Token signer.
//!
//! # Purpose
//! Turns an upstream-authenticated assumed-role ARN into an RS256 JWT signed
//! by the key currently bound to the CURRENT alias.
//!
//! # Trust boundary
//! The caller ARN is taken as already authenticated. This module only checks
//! its shape; it must never be reachable by requests that did not pass an
//! authenticating gateway.
//!
//! # Key invariants
//! - `sub` is the base role ARN, never the session-specific assumed-role ARN.
//! - The header `kid` is the CURRENT key's `jwk_kid` tag; a key without the tag
//!   is never used, since its public half may not be published yet.
//! - Exactly one key-store signature is requested per token.
use crate::store::{KeyStore, StoreError, kid_for_key};
use std::sync::Arc;
use sts_jose::{JoseError, JwtHeader, TokenClaims, assemble, parse_identity, signing_input};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("Unable to resolve identity")]
    IdentityUnresolved,
    #[error("KMS key could not be retrieved")]
    KeyUnavailable,
    #[error("KMS key is not correctly tagged")]
    KeyNotTagged,
    #[error("Token could not be signed")]
    Store(#[from] StoreError),
    #[error("Token could not be signed")]
    Encoding(#[from] JoseError),
}

impl SignError {
    pub fn status_code(&self) -> u16 {
        match self {
            SignError::IdentityUnresolved => 400,
            SignError::KeyUnavailable
            | SignError::KeyNotTagged
            | SignError::Store(_)
            | SignError::Encoding(_) => 500,
        }
    }

    /// Metric label for the failure.
    pub fn reason(&self) -> &'static str {
        match self {
            SignError::IdentityUnresolved => "identity",
            SignError::KeyUnavailable => "key_unavailable",
            SignError::KeyNotTagged => "key_not_tagged",
            SignError::Store(_) => "store",
            SignError::Encoding(_) => "encoding",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub kid: String,
    pub claims: TokenClaims,
}

#[derive(Clone)]
pub struct TokenSigner {
    keys: Arc<dyn KeyStore>,
    current_alias: String,
    issuer: String,
    default_audience: String,
}

impl TokenSigner {
    pub fn new(
        keys: Arc<dyn KeyStore>,
        current_alias: impl Into<String>,
        issuer: impl Into<String>,
        default_audience: impl Into<String>,
    ) -> Self {
        Self {
            keys,
            current_alias: current_alias.into(),
            issuer: issuer.into(),
            default_audience: default_audience.into(),
        }
    }

    pub async fn sign(
        &self,
        user_arn: Option<&str>,
        audience: Option<&str>,
    ) -> Result<SignedToken, SignError> {
        self.sign_at(user_arn, audience, unix_now()).await
    }

    pub async fn sign_at(
        &self,
        user_arn: Option<&str>,
        audience: Option<&str>,
        now: i64,
    ) -> Result<SignedToken, SignError> {
        let result = self.sign_inner(user_arn, audience, now).await;
        match &result {
            Ok(_) => metrics::counter!("sts_tokens_issued_total").increment(1),
            Err(err) => {
                metrics::counter!("sts_sign_failures_total", "reason" => err.reason()).increment(1);
                match err {
                    SignError::Store(_) | SignError::Encoding(_) => {
                        tracing::error!(error = ?err, "token signing failed")
                    }
                    _ => tracing::warn!(reason = err.reason(), user_arn = ?user_arn, "token request refused"),
                }
            }
        }
        result
    }

    async fn sign_inner(
        &self,
        user_arn: Option<&str>,
        audience: Option<&str>,
        now: i64,
    ) -> Result<SignedToken, SignError> {
        let identity = user_arn
            .and_then(parse_identity)
            .ok_or(SignError::IdentityUnresolved)?;
        let audience = audience
            .filter(|value| !value.is_empty())
            .unwrap_or(self.default_audience.as_str());

        let key_id = self
            .keys
            .describe_key(&self.current_alias)
            .await?
            .ok_or(SignError::KeyUnavailable)?;
        let kid = kid_for_key(self.keys.as_ref(), &key_id)
            .await?
            .ok_or(SignError::KeyNotTagged)?;

        let claims = TokenClaims::issued_at(identity.base_role_arn(), audience, &self.issuer, now);
        let input = signing_input(&JwtHeader::rs256(kid.clone()), &claims)?;
        let signature = self.keys.sign(&key_id, input.as_bytes()).await?;
        tracing::debug!(sub = %claims.sub, aud = %claims.aud, kid = %kid, "token signed");
        Ok(SignedToken {
            token: assemble(&input, &signature),
            kid,
            claims,
        })
    }
}

fn unix_now() -> i64 {
    crate::store::unix_now() as i64
}
