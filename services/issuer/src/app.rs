//! Issuer HTTP application wiring.
//!
//! # Purpose
//! Builds the public and internal Axum routers and defines the shared state
//! injected into handlers.
//!
//! # Notes
//! The internal router carries the rotation and sign-event invocations and
//! must only be bound to a private interface.
use crate::api;
use crate::config::IssuerConfig;
use crate::observability;
use crate::rotation::KeyRotator;
use crate::rotation::notify::FailureNotifier;
use crate::rotation::workflow::RotationWorkflow;
use crate::signer::TokenSigner;
use crate::store::{ArtifactStore, KeyStore, LeaseStore};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<dyn KeyStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub signer: TokenSigner,
    pub rotator: KeyRotator,
    pub workflow: RotationWorkflow,
    pub identity_header: String,
}

impl AppState {
    /// Wire the signer, rotator and workflow over a set of stores.
    pub fn from_parts(
        config: &IssuerConfig,
        keys: Arc<dyn KeyStore>,
        artifacts: Arc<dyn ArtifactStore>,
        leases: Arc<dyn LeaseStore>,
        notifier: Arc<dyn FailureNotifier>,
    ) -> Self {
        let signer = TokenSigner::new(
            keys.clone(),
            config.aliases.current.clone(),
            config.issuer.clone(),
            config.default_audience.clone(),
        );
        let rotator = KeyRotator::new(
            keys.clone(),
            artifacts.clone(),
            config.aliases.clone(),
            config.issuer.clone(),
        );
        let workflow =
            RotationWorkflow::new(rotator.clone(), leases, notifier, config.rotation_lease);
        Self {
            keys,
            artifacts,
            signer,
            rotator,
            workflow,
            identity_header: config.identity_header.to_ascii_lowercase(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            // Path only; query strings stay out of spans.
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                path = %request.uri().path(),
                version = ?request.version()
            );
            let _ = span.set_parent(parent);
            span
        });

    Router::new()
        .route("/token", axum::routing::get(api::token::issue_token))
        .route("/discovery/keys", axum::routing::get(api::discovery::jwks))
        .route(
            "/.well-known/openid-configuration",
            axum::routing::get(api::discovery::openid_configuration),
        )
        .route(
            "/v1/system/health",
            axum::routing::get(api::system::system_health),
        )
        .layer(trace_layer)
        .with_state(state)
}

pub fn build_internal_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/internal/rotate",
            axum::routing::post(api::invoke::rotate_step),
        )
        .route(
            "/internal/rotate/cycle",
            axum::routing::post(api::invoke::rotate_cycle),
        )
        .route("/internal/sign", axum::routing::post(api::invoke::sign_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
