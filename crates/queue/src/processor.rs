//! Process one polled batch of fired timers: parse → fire + notify → ack/nack.
//!
//! For the parsed timers, the fire handler (delete, group check, refill) and
//! the notification fan-out run concurrently. A message is acked once both
//! are done. It is nacked when its body cannot be parsed or when its
//! subscriber lookup failed outright, so the transport redelivers it. A
//! failing message that has already been received `max_receives` times is
//! acked and dropped with an error log instead.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use shedwatch_core::{DeliveryTally, FiredTimer};
use shedwatch_notify::NotificationDispatcher;
use shedwatch_scheduler::{FireHandler, FireReport};

use crate::consumer::{QueueConsumer, QueueMessage};
use crate::parser::parse_batch;

/// What one batch did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub received: usize,
    pub unparseable: usize,
    pub fire: FireReport,
    pub delivered: DeliveryTally,
    pub acked: usize,
    pub nacked: usize,
    /// Failing messages dropped after exhausting their receives.
    pub dropped: usize,
    /// Age of the oldest message in the batch.
    pub oldest_age_ms: u64,
}

/// Runs fired-timer batches through the fire handler and the dispatcher.
pub struct FiredBatchProcessor {
    fire: Arc<FireHandler>,
    dispatcher: Arc<NotificationDispatcher>,
    max_receives: u32,
}

/// Receive limit used unless [`FiredBatchProcessor::with_max_receives`] says otherwise.
pub const DEFAULT_MAX_RECEIVES: u32 = 5;

impl FiredBatchProcessor {
    pub fn new(fire: Arc<FireHandler>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            fire,
            dispatcher,
            max_receives: DEFAULT_MAX_RECEIVES,
        }
    }

    pub fn with_max_receives(mut self, max_receives: u32) -> Self {
        self.max_receives = max_receives.max(1);
        self
    }

    pub async fn process(
        &self,
        messages: &[QueueMessage],
        consumer: &dyn QueueConsumer,
    ) -> BatchReport {
        let batch_start = Instant::now();
        let now = Utc::now();
        let mut report = BatchReport {
            received: messages.len(),
            oldest_age_ms: messages
                .iter()
                .map(|m| m.age(now).num_milliseconds().max(0) as u64)
                .max()
                .unwrap_or(0),
            ..BatchReport::default()
        };

        let (parsed, errors) = parse_batch(messages);
        report.unparseable = errors.len();

        for (msg_id, err) in &errors {
            warn!(message_id = %msg_id, error = %err, "Unparseable message");
            if let Some(msg) = messages.iter().find(|m| m.id == *msg_id) {
                self.release(consumer, msg, &mut report).await;
            }
        }

        if parsed.is_empty() {
            return report;
        }

        let timers: Vec<FiredTimer> = parsed.iter().map(|(_, timer)| timer.clone()).collect();
        let deliveries = join_all(timers.iter().map(|timer| self.dispatcher.notify(&timer.event)));
        let (fire_report, outcomes) = tokio::join!(self.fire.handle_batch(&timers), deliveries);
        report.fire = fire_report;

        for ((idx, timer), outcome) in parsed.iter().zip(outcomes) {
            let msg = &messages[*idx];
            match outcome {
                Ok(tally) => {
                    report.delivered += tally;
                    match consumer.ack(&msg.receipt_handle).await {
                        Ok(()) => report.acked += 1,
                        Err(e) => warn!(message_id = %msg.id, error = %e, "Failed to ack"),
                    }
                }
                Err(e) => {
                    error!(
                        message_id = %msg.id,
                        area = %timer.group(),
                        timer = %timer.name,
                        error = %e,
                        "Subscriber lookup failed"
                    );
                    self.release(consumer, msg, &mut report).await;
                }
            }
        }

        info!(
            received = report.received,
            unparseable = report.unparseable,
            deleted = report.fire.deleted,
            refilled = report.fire.refilled.len(),
            delivered = report.delivered.success,
            failed_deliveries = report.delivered.failed,
            acked = report.acked,
            nacked = report.nacked,
            dropped = report.dropped,
            oldest_age_ms = report.oldest_age_ms,
            elapsed_ms = batch_start.elapsed().as_millis() as u64,
            "Fired batch processed"
        );
        report
    }

    /// Return a failing message for redelivery, or drop it once its receives
    /// are used up.
    async fn release(&self, consumer: &dyn QueueConsumer, msg: &QueueMessage, report: &mut BatchReport) {
        if msg.receives_exhausted(self.max_receives) {
            error!(
                message_id = %msg.id,
                attempts = msg.attempt_count,
                max_receives = self.max_receives,
                body = %msg.body,
                "Dropping message after repeated failures"
            );
            match consumer.ack(&msg.receipt_handle).await {
                Ok(()) => report.dropped += 1,
                Err(e) => warn!(message_id = %msg.id, error = %e, "Failed to ack dropped message"),
            }
            return;
        }
        match consumer.nack(&msg.receipt_handle).await {
            Ok(()) => report.nacked += 1,
            Err(e) => warn!(message_id = %msg.id, error = %e, "Failed to nack"),
        }
    }
}
