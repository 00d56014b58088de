//! Failure notification fan-out for rotation cycles.
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const FAILURE_SUBJECT: &str = "STS KeyRotate step function execution failed";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait FailureNotifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log at `error` level.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl FailureNotifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::error!(
            subject = %notification.subject,
            payload = %notification.payload,
            "rotation failure notification"
        );
        Ok(())
    }
}

/// POSTs the notification as JSON to an alerting webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl WebhookNotifier {
    pub fn new(url: impl AsRef<str>) -> anyhow::Result<Self> {
        let url = reqwest::Url::parse(url.as_ref())?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url,
        })
    }
}

#[async_trait]
impl FailureNotifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.client
            .post(self.url.clone())
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Records notifications in memory for inspection.
#[derive(Debug, Default, Clone)]
pub struct MemoryNotifier {
    sent: Arc<RwLock<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl FailureNotifier for MemoryNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.write().await.push(notification.clone());
        Ok(())
    }
}
