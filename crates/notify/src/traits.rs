//! Collaborator traits for the notification fan-out.

use shedwatch_core::{DeliveryRecord, Event, ShedResult, Subscriber};

/// Lookup of webhook subscribers by area.
#[async_trait::async_trait]
pub trait SubscriberDirectory: Send + Sync {
    async fn lookup(&self, area: &str) -> ShedResult<Vec<Subscriber>>;

    /// Human-readable name for this backend (e.g., "dynamodb", "static").
    fn backend_name(&self) -> &str;
}

/// Sink for delivery-attempt records.
///
/// Callers go through [`DeliveryLogWriter`](crate::DeliveryLogWriter), which
/// absorbs failures; implementations just report them.
#[async_trait::async_trait]
pub trait DeliveryLog: Send + Sync {
    async fn record(&self, record: DeliveryRecord) -> ShedResult<()>;

    fn backend_name(&self) -> &str;
}

/// What a webhook endpoint answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

impl WebhookResponse {
    /// Only a plain 200 counts as delivered.
    pub fn is_delivered(&self) -> bool {
        self.status == 200
    }
}

/// Posts one event to one webhook.
///
/// `Ok` means the endpoint answered, whatever the status. `Err` is reserved
/// for transport failures where no response exists.
#[async_trait::async_trait]
pub trait WebhookSender: Send + Sync {
    async fn post(&self, url: &str, event: &Event) -> ShedResult<WebhookResponse>;
}
