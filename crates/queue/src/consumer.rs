//! The transport fired timers arrive on.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// One fired-timer delivery as received from the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    /// The fired timer's JSON payload.
    pub body: String,
    /// Handle for ack/nack (an SQS receipt handle).
    pub receipt_handle: String,
    /// When the timer's provider sent the message.
    pub timestamp: DateTime<Utc>,
    /// How often the transport has handed this message out, this time included.
    pub attempt_count: u32,
}

impl QueueMessage {
    /// Time between the provider sending the message and `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.timestamp).max(Duration::zero())
    }

    /// True once the message has been received `max_receives` times.
    pub fn receives_exhausted(&self, max_receives: u32) -> bool {
        self.attempt_count >= max_receives
    }
}

/// Reachability and depth of the fired-timer queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub connected: bool,
    pub approximate_message_count: Option<u64>,
    pub provider: String,
}

impl fmt::Display for QueueHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.connected { "up" } else { "down" };
        match self.approximate_message_count {
            Some(depth) => write!(f, "{} {} ({} waiting)", self.provider, state, depth),
            None => write!(f, "{} {}", self.provider, state),
        }
    }
}

/// Source of fired timers.
///
/// A message that is neither acked nor nacked becomes visible again once its
/// visibility timeout lapses.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Poll up to `max_messages`. Long-polls; empty when nothing fired.
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError>;

    /// The firing was handled: remove it.
    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Hand the firing back for immediate redelivery.
    async fn nack(&self, receipt_handle: &str) -> Result<(), QueueError>;

    async fn health_check(&self) -> Result<QueueHealth, QueueError>;

    /// Depth of the dead-letter queue, `None` when there is none.
    async fn dlq_depth(&self) -> Result<Option<u64>, QueueError> {
        Ok(None)
    }
}
