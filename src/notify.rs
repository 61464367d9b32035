use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("chat webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("chat webhook returned HTTP {status}")]
    Status { status: u16 },
}

/// Human-readable message delivery to a chat channel.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    body: serde_json::Value,
) -> Result<(), NotifyError> {
    let resp = client
        .post(url)
        .json(&body)
        .timeout(NOTIFY_TIMEOUT)
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(NotifyError::Status {
            status: status.as_u16(),
        });
    }
    Ok(())
}

pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl ChatNotifier for DiscordNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        post_json(&self.client, &self.webhook_url, json!({ "content": text })).await
    }
}

pub struct TeamsNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl TeamsNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl ChatNotifier for TeamsNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        post_json(&self.client, &self.webhook_url, json!({ "text": text })).await
    }
}

/// Sends to every configured channel; succeeds if at least one delivery did.
pub struct FanoutNotifier {
    targets: Vec<Box<dyn ChatNotifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Box<dyn ChatNotifier>>) -> Self {
        Self { targets }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl ChatNotifier for FanoutNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let mut last_err = None;
        let mut delivered = false;
        for target in &self.targets {
            match target.send(text).await {
                Ok(()) => delivered = true,
                Err(e) => {
                    tracing::warn!(error = %e, "chat notification failed");
                    last_err = Some(e);
                }
            }
        }
        match (delivered, last_err) {
            (false, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }
}
