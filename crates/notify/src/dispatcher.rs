//! Fans a fired event out to every subscriber of its area.
//!
//! Subscribers are posted to one after another. Each attempt produces one
//! delivery record, and no single subscriber's failure stops the others.

use std::sync::Arc;
use std::time::Instant;

use shedwatch_core::{
    DeliveryRecord, DeliveryTally, Event, ShedResult, Subscriber, TRANSPORT_FAILURE_STATUS,
};

use crate::delivery_log::DeliveryLogWriter;
use crate::traits::{SubscriberDirectory, WebhookSender};

/// Delivers fired events to webhook subscribers.
pub struct NotificationDispatcher {
    directory: Arc<dyn SubscriberDirectory>,
    sender: Arc<dyn WebhookSender>,
    log: Arc<DeliveryLogWriter>,
}

impl NotificationDispatcher {
    pub fn new(
        directory: Arc<dyn SubscriberDirectory>,
        sender: Arc<dyn WebhookSender>,
        log: Arc<DeliveryLogWriter>,
    ) -> Self {
        Self {
            directory,
            sender,
            log,
        }
    }

    /// Look up the event's subscribers and dispatch to them.
    ///
    /// A directory failure is returned: without subscribers there is nothing
    /// to deliver, and the caller decides whether to redeliver the firing.
    pub async fn notify(&self, event: &Event) -> ShedResult<DeliveryTally> {
        let subscribers = self.directory.lookup(&event.area_id).await?;
        if subscribers.is_empty() {
            tracing::debug!(
                area = %event.area_id,
                backend = self.directory.backend_name(),
                "No subscribers for area"
            );
        }
        Ok(self.dispatch(event, &subscribers).await)
    }

    /// Post `event` to each subscriber in turn.
    ///
    /// Only HTTP 200 counts as a success. Every attempt is recorded,
    /// transport failures with [`TRANSPORT_FAILURE_STATUS`].
    pub async fn dispatch(&self, event: &Event, subscribers: &[Subscriber]) -> DeliveryTally {
        let mut tally = DeliveryTally::default();

        for subscriber in subscribers {
            let url = subscriber.webhook_url.as_str();
            let start = Instant::now();
            let result = self.sender.post(url, event).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let record = match result {
                Ok(response) => {
                    if response.is_delivered() {
                        tally.success += 1;
                        tracing::info!(
                            area = %event.area_id,
                            url,
                            duration_ms,
                            "Notification delivered"
                        );
                    } else {
                        tally.failed += 1;
                        tracing::warn!(
                            area = %event.area_id,
                            url,
                            status = response.status,
                            duration_ms,
                            "Notification rejected"
                        );
                    }
                    DeliveryRecord::new(url, i32::from(response.status), response.body, event.clone())
                }
                Err(e) => {
                    tally.failed += 1;
                    tracing::warn!(
                        area = %event.area_id,
                        url,
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    DeliveryRecord::new(url, TRANSPORT_FAILURE_STATUS, e.to_string(), event.clone())
                }
            };

            self.log.submit(record);
        }

        tracing::info!(
            area = %event.area_id,
            timer = event.timer_name().unwrap_or_default(),
            success = tally.success,
            failed = tally.failed,
            "Fan-out complete"
        );
        tally
    }
}
