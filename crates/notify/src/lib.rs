//! Webhook fan-out for fired outage timers.
//!
//! This crate provides:
//! - `SubscriberDirectory` trait with static (JSON) and DynamoDB backends
//! - `DeliveryLog` trait with log-line, in-memory and DynamoDB backends, fronted by a
//!   fire-and-forget `DeliveryLogWriter`
//! - `WebhookSender` trait with a reqwest backend
//! - `NotificationDispatcher` that posts an event to each subscriber of its area

pub mod delivery_log;
pub mod directory;
pub mod dispatcher;
pub mod traits;
pub mod webhook;

pub use delivery_log::{
    DeliveryLogWriter, DynamoDeliveryLog, InMemoryDeliveryLog, TracingDeliveryLog,
};
pub use directory::{DynamoSubscriberDirectory, StaticSubscriberDirectory};
pub use dispatcher::NotificationDispatcher;
pub use traits::{DeliveryLog, SubscriberDirectory, WebhookResponse, WebhookSender};
pub use webhook::ReqwestWebhookSender;
