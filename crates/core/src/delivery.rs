//! Subscribers and the audit trail of deliveries made to them.

use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{AreaId, Event};

/// Response status recorded when the request never produced an HTTP response.
pub const TRANSPORT_FAILURE_STATUS: i32 = 0;

/// A webhook endpoint interested in one area's outages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    #[serde(rename = "area_name")]
    pub area_id: AreaId,
    #[serde(rename = "webhookUrl")]
    pub webhook_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Subscriber {
    pub fn new(area_id: impl Into<AreaId>, webhook_url: impl Into<String>) -> Self {
        Self {
            area_id: area_id.into(),
            webhook_url: webhook_url.into(),
            email: None,
        }
    }
}

/// One delivery attempt of a fired event to one subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub webhook_url: String,
    pub timestamp: DateTime<Utc>,
    /// HTTP status, or [`TRANSPORT_FAILURE_STATUS`].
    pub response_status: i32,
    pub request_payload: Event,
    pub response_body: String,
}

impl DeliveryRecord {
    pub fn new(
        webhook_url: impl Into<String>,
        response_status: i32,
        response_body: impl Into<String>,
        request_payload: Event,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            webhook_url: webhook_url.into(),
            timestamp: Utc::now(),
            response_status,
            request_payload,
            response_body: response_body.into(),
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        self.response_status == TRANSPORT_FAILURE_STATUS
    }
}

/// Success/failure counts for one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryTally {
    pub success: usize,
    pub failed: usize,
}

impl DeliveryTally {
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

impl AddAssign for DeliveryTally {
    fn add_assign(&mut self, rhs: Self) {
        self.success += rhs.success;
        self.failed += rhs.failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_reads_directory_field_names() {
        let json = r#"{"area_name":"tshwane-5","webhookUrl":"https://hooks.example/a","email":"ops@example.com"}"#;
        let sub: Subscriber = serde_json::from_str(json).unwrap();
        assert_eq!(sub.area_id, "tshwane-5");
        assert_eq!(sub.webhook_url, "https://hooks.example/a");
        assert_eq!(sub.email.as_deref(), Some("ops@example.com"));

        let bare: Subscriber =
            serde_json::from_str(r#"{"area_name":"x","webhookUrl":"https://h"}"#).unwrap();
        assert!(bare.email.is_none());
    }

    #[test]
    fn tally_accumulates() {
        let mut total = DeliveryTally::default();
        total += DeliveryTally { success: 2, failed: 1 };
        total += DeliveryTally { success: 0, failed: 3 };
        assert_eq!(total, DeliveryTally { success: 2, failed: 4 });
        assert_eq!(total.total(), 6);
    }
}
