//! Alert batching and delivery.
//!
//! Conditions raised during polling are rendered to lines, queued in an
//! [`AlertBatcher`] per notification channel, and released as one message
//! per cooldown window.

pub mod actor;
pub mod batcher;
pub mod notifier;
pub mod webhook;

pub use actor::{spawn_batcher, BatcherClosed, BatcherHandle};
pub use batcher::{AlertBatcher, BatchState, DEFAULT_QUEUE_CAPACITY};
pub use notifier::{LogNotifier, Notifier, NotifyError, RecordingNotifier};
pub use webhook::WebhookNotifier;
