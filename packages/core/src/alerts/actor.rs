//! Single-owner task around an [`AlertBatcher`].
//!
//! The poll loop and the heartbeat loop both reach the same batcher, so
//! its three operations are serialized by handing the batcher to one task
//! and sending it commands over a bounded channel. Every command carries
//! an acknowledgement that fires once the batcher state has changed.
//!
//! Finished messages go to a second task per channel that owns the
//! notifier. A notifier that hangs only delays its own channel; the
//! batcher keeps accepting commands and the loops keep running.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::alerts::batcher::AlertBatcher;
use crate::alerts::notifier::Notifier;
use crate::metrics::AppMetrics;

const COMMAND_BUFFER: usize = 64;
const DELIVERY_BUFFER: usize = 16;

#[derive(Debug)]
enum Op {
    Raise(String),
    Tick,
    ForceFlush(String),
    Settle,
}

#[derive(Debug)]
struct Command {
    op: Op,
    done: oneshot::Sender<()>,
}

#[derive(Debug)]
enum Outgoing {
    Message(String),
    /// Fires once every message queued before it has been attempted.
    Marker(oneshot::Sender<()>),
}

/// Error returned when the batcher task is gone.
#[derive(Debug, thiserror::Error)]
#[error("alert batcher for channel '{0}' has stopped")]
pub struct BatcherClosed(pub String);

/// Cloneable handle to a running batcher task.
#[derive(Debug, Clone)]
pub struct BatcherHandle {
    channel: String,
    tx: mpsc::Sender<Command>,
}

impl BatcherHandle {
    /// Queue one rendered condition line.
    pub async fn raise(&self, message: String) -> Result<(), BatcherClosed> {
        self.call(Op::Raise(message)).await
    }

    /// Flush if the cooldown window has elapsed.
    pub async fn tick(&self) -> Result<(), BatcherClosed> {
        self.call(Op::Tick).await
    }

    /// Hand `report` plus anything pending to the notifier right now.
    pub async fn force_flush(&self, report: String) -> Result<(), BatcherClosed> {
        self.call(Op::ForceFlush(report)).await
    }

    /// Wait until every message produced by earlier commands has been
    /// delivered or has failed.
    pub async fn settled(&self) -> Result<(), BatcherClosed> {
        self.call(Op::Settle).await
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    async fn call(&self, op: Op) -> Result<(), BatcherClosed> {
        let (done, ack) = oneshot::channel();
        self.tx
            .send(Command { op, done })
            .await
            .map_err(|_| BatcherClosed(self.channel.clone()))?;
        ack.await.map_err(|_| BatcherClosed(self.channel.clone()))
    }
}

/// Spawn the task that owns `batcher` and the task that delivers its
/// messages through `notifier`.
///
/// Both tasks end when every handle has been dropped; whatever is still
/// pending in the batcher at that point is discarded.
pub fn spawn_batcher(
    batcher: AlertBatcher,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<AppMetrics>,
) -> (BatcherHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let (outbox, deliveries) = mpsc::channel(DELIVERY_BUFFER);
    let channel = notifier.channel_name().to_string();

    let courier = Courier {
        notifier,
        metrics: metrics.clone(),
        channel: channel.clone(),
    };
    tokio::spawn(courier.run(deliveries));

    let task = BatcherTask {
        batcher,
        outbox,
        metrics,
        channel: channel.clone(),
    };
    let join = tokio::spawn(task.run(rx));

    (BatcherHandle { channel, tx }, join)
}

struct BatcherTask {
    batcher: AlertBatcher,
    outbox: mpsc::Sender<Outgoing>,
    metrics: Arc<AppMetrics>,
    channel: String,
}

impl BatcherTask {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        tracing::debug!("Alert batcher for '{}' started", self.channel);

        while let Some(Command { op, done }) = rx.recv().await {
            let outgoing = match op {
                Op::Raise(message) => self.batcher.raise(message),
                Op::Tick => self.batcher.tick(),
                Op::ForceFlush(report) => Some(self.batcher.force_flush(&report)),
                Op::Settle => {
                    // The courier acknowledges once it reaches the marker.
                    if let Err(mpsc::error::SendError(Outgoing::Marker(done))) =
                        self.outbox.send(Outgoing::Marker(done)).await
                    {
                        let _ = done.send(());
                    }
                    continue;
                }
            };

            if let Some(message) = outgoing {
                self.hand_off(message);
            }

            self.metrics
                .alerts_pending
                .with_label_values(&[self.channel.as_str()])
                .set(self.batcher.pending_len() as f64);

            // The caller may have stopped waiting; that is fine.
            let _ = done.send(());
        }

        let dropped = self.batcher.pending_len();
        if dropped > 0 {
            tracing::warn!(
                "Alert batcher for '{}' stopped with {} undelivered alerts",
                self.channel,
                dropped
            );
        }
    }

    /// Queue a finished message for delivery without waiting on the notifier.
    fn hand_off(&self, message: String) {
        if let Err(err) = self.outbox.try_send(Outgoing::Message(message)) {
            self.metrics
                .notification_failures_total
                .with_label_values(&[self.channel.as_str()])
                .inc();
            match err {
                mpsc::error::TrySendError::Full(_) => tracing::error!(
                    "Delivery queue for '{}' is full, dropping message",
                    self.channel
                ),
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::error!("Delivery task for '{}' has stopped", self.channel)
                }
            }
        }
    }
}

/// Delivers finished messages for one channel, in order.
struct Courier {
    notifier: Arc<dyn Notifier>,
    metrics: Arc<AppMetrics>,
    channel: String,
}

impl Courier {
    async fn run(self, mut deliveries: mpsc::Receiver<Outgoing>) {
        while let Some(outgoing) = deliveries.recv().await {
            match outgoing {
                Outgoing::Message(message) => self.deliver(&message).await,
                Outgoing::Marker(done) => {
                    let _ = done.send(());
                }
            }
        }
    }

    async fn deliver(&self, message: &str) {
        match self.notifier.send(message).await {
            Ok(()) => {
                self.metrics
                    .notifications_total
                    .with_label_values(&[self.channel.as_str()])
                    .inc();
                tracing::info!("Delivered notification via '{}'", self.channel);
            }
            Err(err) => {
                self.metrics
                    .notification_failures_total
                    .with_label_values(&[self.channel.as_str()])
                    .inc();
                tracing::error!("Notification via '{}' failed: {}", self.channel, err);
            }
        }
    }
}
