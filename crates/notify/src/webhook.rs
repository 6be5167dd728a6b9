//! HTTP webhook delivery.
//!
//! Fired events are posted as JSON to the subscriber's URL. Any HTTP
//! response, including non-2xx, is returned to the caller for tallying and
//! logging; only transport errors become `Err`.

use std::time::Duration;

use shedwatch_core::config::NotifyConfig;
use shedwatch_core::{Event, ShedError, ShedResult};

use crate::traits::{WebhookResponse, WebhookSender};

/// [`WebhookSender`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestWebhookSender {
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl ReqwestWebhookSender {
    pub fn new(timeout: Duration) -> ShedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShedError::Config(format!("failed to build webhook client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &NotifyConfig) -> ShedResult<Self> {
        Self::new(Duration::from_secs(config.webhook_timeout_secs))
    }
}

#[async_trait::async_trait]
impl WebhookSender for ReqwestWebhookSender {
    async fn post(&self, url: &str, event: &Event) -> ShedResult<WebhookResponse> {
        let body = serde_json::to_string(event)
            .map_err(|e| ShedError::Decode(format!("failed to serialize event: {e}")))?;

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ShedError::Delivery {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if !status.is_success() {
            tracing::warn!(url, %status, body = %body, "webhook returned non-2xx status");
        } else {
            tracing::debug!(url, %status, "webhook notification delivered");
        }

        Ok(WebhookResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_event() -> Event {
        let start = DateTime::parse_from_rfc3339("2026-10-18T14:00:00+02:00").unwrap();
        let mut event = Event::new(
            "tshwane-5",
            "Stage 4",
            start,
            start + ChronoDuration::hours(2),
            "https://twitter.com/Eskom_SA",
        )
        .unwrap();
        event.assign_timer_name("tshwane-5_abc").unwrap();
        event
    }

    #[tokio::test]
    async fn posts_event_as_json() {
        let server = MockServer::start().await;
        let event = sample_event();
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "area_id": "tshwane-5",
                "stage": "Stage 4",
                "start_time": "2026-10-18T14:00:00+02:00",
                "end_time": "2026-10-18T16:00:00+02:00",
                "source": "https://twitter.com/Eskom_SA",
                "timer_name": "tshwane-5_abc"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let sender = ReqwestWebhookSender::new(std::time::Duration::from_secs(5)).unwrap();
        let response = sender
            .post(&format!("{}/hook", server.uri()), &event)
            .await
            .unwrap();

        assert_eq!(response, WebhookResponse { status: 200, body: "ok".into() });
        assert!(response.is_delivered());
    }

    #[tokio::test]
    async fn non_success_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let sender = ReqwestWebhookSender::new(std::time::Duration::from_secs(5)).unwrap();
        let response = sender.post(&server.uri(), &sample_event()).await.unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(response.body, "boom");
        assert!(!response.is_delivered());
    }

    #[tokio::test]
    async fn other_2xx_is_not_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let sender = ReqwestWebhookSender::new(std::time::Duration::from_secs(5)).unwrap();
        let response = sender.post(&server.uri(), &sample_event()).await.unwrap();
        assert!(!response.is_delivered());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_delivery_error() {
        let sender = ReqwestWebhookSender::new(std::time::Duration::from_secs(2)).unwrap();
        // Port 9 (discard) on loopback is closed in test environments.
        let err = sender
            .post("http://127.0.0.1:9/hook", &sample_event())
            .await
            .unwrap_err();
        match err {
            ShedError::Delivery { url, .. } => assert_eq!(url, "http://127.0.0.1:9/hook"),
            other => panic!("expected Delivery error, got: {other:?}"),
        }
    }
}
