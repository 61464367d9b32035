use crate::config::StartupConfig;
use crate::notify::ChatNotifier;
use chrono::Utc;
use std::time::Duration;

pub const RETRY_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyOutcome {
    pub sent: bool,
    pub reason: String,
}

impl NotifyOutcome {
    fn skipped(reason: &str) -> Self {
        Self {
            sent: false,
            reason: reason.to_string(),
        }
    }
}

pub fn restart_message(status_url: &str) -> String {
    let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    format!("🔁 Farmbot container restarted at {now}. Status: {status_url}")
}

/// Announce a restart on the general Discord channel, retrying transient
/// failures with a fixed pause.
pub async fn send_restart_notification(
    config: &StartupConfig,
    notifier: Option<&dyn ChatNotifier>,
    pause: Duration,
) -> NotifyOutcome {
    if !config.enabled {
        return NotifyOutcome::skipped("disabled");
    }
    let Some(notifier) = notifier else {
        return NotifyOutcome::skipped("missing_webhook");
    };

    let message = restart_message(&config.status_url);
    let attempts = config.retries.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match notifier.send(&message).await {
            Ok(()) => {
                return NotifyOutcome {
                    sent: true,
                    reason: format!("sent_attempt_{attempt}"),
                }
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "restart notification attempt failed");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    NotifyOutcome {
        sent: false,
        reason: format!(
            "post_failed:{}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ),
    }
}
