use crate::config::{TriggerConfig, TriggerMethod};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriggerError {
    /// Transport failure or timeout.
    #[error("trigger request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("trigger returned HTTP {status}")]
    Status { status: u16 },

    /// Anything that isn't the device's fault.
    #[error("internal trigger error: {0}")]
    Internal(String),
}

impl TriggerError {
    /// Whether the failure came from the downstream device rather than from us.
    pub fn is_downstream(&self) -> bool {
        !matches!(self, TriggerError::Internal(_))
    }
}

/// The action a motion event fires. Only success or failure matters.
#[async_trait]
pub trait DeviceTrigger: Send + Sync {
    async fn fire(&self) -> Result<(), TriggerError>;
    fn target(&self) -> &str;
}

pub struct HttpTrigger {
    client: reqwest::Client,
    url: String,
    method: TriggerMethod,
    timeout: Duration,
}

impl HttpTrigger {
    pub fn new(config: &TriggerConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &TriggerConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            method: config.method,
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl DeviceTrigger for HttpTrigger {
    async fn fire(&self) -> Result<(), TriggerError> {
        let request = match self.method {
            TriggerMethod::Get => self.client.get(&self.url),
            TriggerMethod::Post => self.client.post(&self.url),
        };

        let resp = request.timeout(self.timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TriggerError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn target(&self) -> &str {
        &self.url
    }
}
