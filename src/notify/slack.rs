use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::error::{Result, SecurityGateError};
use crate::notify::Notifier;

/// Incoming-webhook notifier
pub struct SlackNotifier {
    webhook_url: String,
    http_client: Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http_client: Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, message: &str, channel: &str) -> Result<()> {
        debug!("Posting notification to #{}", channel);
        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(&json!({ "channel": format!("#{}", channel), "text": message }))
            .send()
            .await
            .map_err(|e| SecurityGateError::NotificationError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SecurityGateError::NotificationError(format!(
                "Slack webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
