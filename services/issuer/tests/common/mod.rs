#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use std::sync::Arc;
use std::time::Duration;
use sts_issuer::app::{AppState, build_internal_router, build_router};
use sts_issuer::config::{Backend, IssuerConfig, KeyAliases};
use sts_issuer::rotation::notify::MemoryNotifier;
use sts_issuer::store::memory::{InMemoryArtifactStore, InMemoryKeyStore, InMemoryLeaseStore};

pub const ISSUER: &str = "https://oidc.example.com";
pub const AUDIENCE: &str = "sts.example.com";
pub const IDENTITY_HEADER: &str = "x-sts-caller-arn";
pub const CALLER_ARN: &str =
    "arn:aws:sts:eu-central-1:123456789012:assumed-role/my-role/my-session";
pub const BASE_ROLE_ARN: &str = "arn:aws:iam:eu-central-1:123456789012:role/my-role";

pub struct TestApp {
    pub state: AppState,
    pub keys: Arc<InMemoryKeyStore>,
    pub notifier: Arc<MemoryNotifier>,
    pub public: Router,
    pub internal: Router,
}

pub fn config() -> IssuerConfig {
    IssuerConfig {
        issuer: ISSUER.to_string(),
        default_audience: AUDIENCE.to_string(),
        s3_bucket: None,
        aliases: KeyAliases::default(),
        bind_addr: "127.0.0.1:0".parse().expect("bind"),
        internal_bind: "127.0.0.1:0".parse().expect("internal"),
        metrics_bind: "127.0.0.1:0".parse().expect("metrics"),
        backend: Backend::Memory,
        identity_header: IDENTITY_HEADER.to_string(),
        rotation_interval: Duration::from_secs(3600),
        skip_initial_rotation: true,
        rotation_lease: Duration::from_secs(60),
        alert_webhook_url: None,
    }
}

pub fn app() -> TestApp {
    let keys = Arc::new(InMemoryKeyStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let state = AppState::from_parts(
        &config(),
        keys.clone(),
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(InMemoryLeaseStore::new()),
        notifier.clone(),
    );
    TestApp {
        public: build_router(state.clone()),
        internal: build_internal_router(state.clone()),
        state,
        keys,
        notifier,
    }
}

/// App whose ring was bootstrapped with two full cycles.
pub async fn populated_app() -> TestApp {
    let app = app();
    sts_issuer::rotation::scheduler::populate_keys(&app.state.workflow)
        .await
        .expect("populate");
    app
}

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub async fn read_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn token_request(uri: &str, caller: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(IDENTITY_HEADER, caller)
        .body(Body::empty())
        .expect("request")
}
