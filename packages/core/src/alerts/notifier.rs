//! Notification channels.
//!
//! A [`Notifier`] delivers one finished message. Delivery is best effort:
//! failures are returned to the caller, which logs and counts them, and
//! nothing in the pipeline retries.

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from a notification channel.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("could not reach notification endpoint: {0}")]
    Transport(String),

    #[error("notification endpoint rejected message with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A channel that finished alert and report messages are delivered to.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), NotifyError>;

    /// Channel name used in logs and metric labels.
    fn channel_name(&self) -> &str;
}

/// Writes every message to the application log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        tracing::info!(channel = "log", "Notification:\n{}", message);
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}

/// Keeps every delivered message in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails. Attempts are still recorded.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Messages delivered so far, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.to_string());
        }
        if self.fail {
            return Err(NotifyError::Transport("recording notifier set to fail".into()));
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.send("ALERT: something").await.is_ok());
        assert_eq!(LogNotifier.channel_name(), "log");
    }

    #[tokio::test]
    async fn recording_notifier_keeps_messages_in_order() {
        let notifier = RecordingNotifier::new();
        notifier.send("first").await.unwrap();
        notifier.send("").await.unwrap();

        assert_eq!(notifier.messages(), vec!["first".to_string(), String::new()]);
    }

    #[tokio::test]
    async fn failing_notifier_records_attempt_and_errors() {
        let notifier = RecordingNotifier::failing();
        assert!(notifier.send("x").await.is_err());
        assert_eq!(notifier.messages().len(), 1);
    }
}
