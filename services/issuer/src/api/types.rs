//! HTTP API request/response types.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub key_backend: String,
    pub current_key_bound: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct TokenQuery {
    pub aud: Option<String>,
}

/// Rotation engine invocation: `{"step": "<name>"}`. Any other shape is
/// kept as-is and treated as an unknown step.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RotateRequest {
    #[serde(default)]
    pub step: serde_json::Value,
}

impl RotateRequest {
    /// Lenient decode: a body that is not a JSON object yields an empty request.
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// Name to dispatch on; non-string steps are rendered as JSON so they
    /// never match a real step.
    pub fn step_name(&self) -> String {
        match &self.step {
            serde_json::Value::String(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RotateResponse {
    pub step: serde_json::Value,
    pub handled: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CycleResponse {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Platform-shaped sign event; only the fields the signer reads are modelled.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignEvent {
    #[serde(default)]
    pub request_context: RequestContext,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RequestContext {
    #[serde(default)]
    pub identity: Option<RequestIdentity>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequestIdentity {
    #[serde(default)]
    pub user_arn: Option<String>,
}

impl SignEvent {
    pub fn user_arn(&self) -> Option<&str> {
        self.request_context
            .identity
            .as_ref()
            .and_then(|identity| identity.user_arn.as_deref())
    }

    pub fn audience(&self) -> Option<&str> {
        self.query_string_parameters
            .as_ref()
            .and_then(|params| params.get("aud"))
            .map(String::as_str)
    }
}

/// `{statusCode, body}` result returned for a sign event.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignResult {
    pub status_code: u16,
    pub body: String,
}
