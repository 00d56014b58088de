//! STS issuer service entry point.
//!
//! # Purpose
//! Wires configuration, key and artifact backends, the rotation workflow and
//! the HTTP routers, then serves the public API until shutdown.
//!
//! # Notes
//! The `build_state` helper keeps wiring testable and minimizes main setup logic.
use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use sts_issuer::app::{AppState, build_internal_router, build_router};
use sts_issuer::config::{Backend, IssuerConfig};
use sts_issuer::observability;
use sts_issuer::rotation::notify::{FailureNotifier, LogNotifier, WebhookNotifier};
use sts_issuer::rotation::scheduler::{populate_keys, spawn_rotation_scheduler};
use sts_issuer::store::aws::{KmsKeyStore, S3ArtifactStore, S3LeaseStore, load_sdk_config};
use sts_issuer::store::memory::{InMemoryArtifactStore, InMemoryKeyStore, InMemoryLeaseStore};
use sts_issuer::store::{ArtifactStore, KeyStore, LeaseStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IssuerConfig::from_env_or_yaml().context("issuer config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: IssuerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("sts-issuer")?;
    let state = build_state(&config).await?;
    tracing::info!(
        backend = state.keys.backend_name(),
        issuer = %config.issuer,
        "issuer state ready"
    );

    if config.skip_initial_rotation {
        tracing::info!("initial key population skipped");
    } else {
        match populate_keys(&state.workflow).await {
            Ok(outcomes) => {
                let outcomes: Vec<&str> = outcomes.iter().map(|outcome| outcome.as_str()).collect();
                tracing::info!(?outcomes, "initial key population finished");
            }
            Err(err) => tracing::error!(error = %err, "initial key population failed"),
        }
    }

    let scheduler_task = spawn_rotation_scheduler(state.workflow.clone(), config.rotation_interval);
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let internal_addr = config.internal_bind;
    let internal_app = build_internal_router(state.clone());
    let internal_task = tokio::spawn(async move {
        tracing::info!(%internal_addr, "internal invocation listener");
        match tokio::net::TcpListener::bind(internal_addr).await {
            Ok(listener) => {
                let _ = axum::serve(listener, internal_app.into_make_service()).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to bind internal listener");
            }
        }
    });

    let app = build_router(state);
    let addr = config.bind_addr;
    tracing::info!(%addr, "issuer listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    for task in [&scheduler_task, &internal_task] {
        task.abort();
    }
    metrics_task.abort();
    let _ = scheduler_task.await;
    let _ = internal_task.await;
    let _ = metrics_task.await;
    Ok(())
}

async fn build_state(config: &IssuerConfig) -> anyhow::Result<AppState> {
    let (keys, artifacts, leases): (
        Arc<dyn KeyStore>,
        Arc<dyn ArtifactStore>,
        Arc<dyn LeaseStore>,
    ) = match config.backend {
        Backend::Memory => (
            Arc::new(InMemoryKeyStore::new()),
            Arc::new(InMemoryArtifactStore::new()),
            Arc::new(InMemoryLeaseStore::new()),
        ),
        Backend::Aws => {
            let bucket = config
                .s3_bucket
                .clone()
                .context("S3_BUCKET is required for the aws backend")?;
            let sdk_config = load_sdk_config().await;
            let s3 = aws_sdk_s3::Client::new(&sdk_config);
            (
                Arc::new(KmsKeyStore::from_conf(&sdk_config)),
                Arc::new(S3ArtifactStore::new(s3.clone(), bucket.clone())),
                Arc::new(S3LeaseStore::new(s3, bucket)),
            )
        }
    };

    let notifier: Arc<dyn FailureNotifier> = match &config.alert_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone()).context("alert webhook")?),
        None => Arc::new(LogNotifier),
    };

    Ok(AppState::from_parts(config, keys, artifacts, leases, notifier))
}
