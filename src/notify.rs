//! Alert delivery.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification error types.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Delivers free-form alert text somewhere a human will see it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Posts `{"text": ...}` to a Slack-compatible incoming webhook.
///
/// Without a webhook the alert is only logged.
pub struct WebhookNotifier {
    webhook: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(webhook: Option<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self { webhook, client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let Some(webhook) = &self.webhook else {
            tracing::warn!("Alert webhook not configured. Alert: {}", text);
            return Ok(());
        };

        self.client
            .post(webhook)
            .json(&json!({ "text": text }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
