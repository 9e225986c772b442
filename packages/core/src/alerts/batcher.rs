//! Cooldown-based alert batching.
//!
//! `AlertBatcher` holds a bounded queue of rendered condition lines and
//! decides when they may leave as one message. It never talks to a
//! notifier itself: every operation that flushes hands the finished
//! message back to the caller, which keeps the state machine synchronous
//! and easy to drive from tests.
//!
//! The batcher is not `Sync`; it is owned by a single task (see
//! [`crate::alerts::actor`]) and reached through message passing.

use std::time::Duration;

use tokio::time::Instant;

/// Default number of pending lines before a flush is forced.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Observable batcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Nothing pending, no cooldown running.
    Idle,
    /// At least one line pending; flush permitted at `flush_at`.
    Accumulating { flush_at: Instant },
}

/// Bounded, order-preserving alert queue with a cooldown timer.
#[derive(Debug)]
pub struct AlertBatcher {
    pending: Vec<String>,
    capacity: usize,
    cooldown: Duration,
    state: BatchState,
}

impl AlertBatcher {
    /// Create an idle batcher. A capacity of zero is treated as one.
    pub fn new(capacity: usize, cooldown: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Vec::with_capacity(capacity),
            capacity,
            cooldown,
            state: BatchState::Idle,
        }
    }

    /// Queue a message.
    ///
    /// From Idle this starts the cooldown window. When the queue is already
    /// full, everything pending is flushed first and returned, and the new
    /// message opens a fresh window; nothing is ever dropped.
    pub fn raise(&mut self, message: String) -> Option<String> {
        let flushed = if self.pending.len() >= self.capacity {
            tracing::warn!(
                "Alert queue full ({} pending), forcing early flush",
                self.pending.len()
            );
            Some(self.drain())
        } else {
            None
        };

        if self.state == BatchState::Idle {
            self.state = BatchState::Accumulating {
                flush_at: Instant::now() + self.cooldown,
            };
        }
        self.pending.push(message);

        flushed
    }

    /// Flush if the cooldown window has elapsed.
    pub fn tick(&mut self) -> Option<String> {
        match self.state {
            BatchState::Accumulating { flush_at } if Instant::now() >= flush_at => {
                Some(self.drain())
            }
            _ => None,
        }
    }

    /// Flush immediately, ignoring the cooldown.
    ///
    /// The message is `report` followed by any pending lines; both may be
    /// empty. The batcher is Idle afterwards, so the next `raise` opens a
    /// new window.
    pub fn force_flush(&mut self, report: &str) -> String {
        let pending = self.drain();
        match (report.is_empty(), pending.is_empty()) {
            (_, true) => report.to_string(),
            (true, false) => pending,
            (false, false) => format!("{}\n{}", report, pending),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == BatchState::Idle
    }

    /// Number of lines waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn drain(&mut self) -> String {
        let message = self.pending.join("\n");
        self.pending.clear();
        self.state = BatchState::Idle;
        message
    }
}
