//! Webhook alert delivery.
//!
//! Posts each finished message to a chat webhook (Slack, Mattermost and
//! Discord-compatible endpoints accept the same `{"text": ...}` body).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::alerts::notifier::{Notifier, NotifyError};

/// JSON body posted to the webhook.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub text: &'a str,
}

/// Upper bound on one delivery, connect and response included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers messages with an HTTP POST to a fixed webhook URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    http: Client,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .json(&WebhookPayload { text: message })
            .send()
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("Webhook accepted message ({} bytes)", message.len());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}
