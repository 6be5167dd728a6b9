//! AWS SQS consumer for fired timers.
//!
//! EventBridge Scheduler delivers each fired timer's payload to this queue.

use async_trait::async_trait;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use tracing::{debug, info, warn};

use shedwatch_core::config::{AwsConfig, QueueConfig};

use crate::consumer::{QueueConsumer, QueueHealth, QueueMessage};
use crate::error::QueueError;

/// SQS long-poll wait per receive call.
const WAIT_TIME_SECS: i32 = 20;

/// SQS-backed fired-timer queue.
pub struct SqsConsumer {
    client: Client,
    queue_url: String,
    dlq_url: Option<String>,
    visibility_timeout_secs: i32,
}

impl SqsConsumer {
    /// Create a consumer from project config.
    ///
    /// Credentials come from the static keys in `aws` when both are set,
    /// otherwise from the default provider chain (instance/task role).
    pub async fn new(aws: &AwsConfig, queue: &QueueConfig) -> Result<Self, QueueError> {
        if !queue.is_configured() {
            return Err(QueueError::Config("FIRED_QUEUE_URL must be set".into()));
        }

        let sdk_config = aws.load_sdk_config().await;
        let client = Client::new(&sdk_config);

        info!(
            queue_url = %queue.queue_url,
            region = %aws.region,
            static_credentials = aws.has_static_credentials(),
            "SQS consumer initialized"
        );

        Ok(Self {
            client,
            queue_url: queue.queue_url.clone(),
            dlq_url: queue.dlq_url.clone(),
            visibility_timeout_secs: queue.visibility_timeout_secs as i32,
        })
    }

    async fn approximate_depth(&self, queue_url: &str) -> Result<Option<u64>, QueueError> {
        let resp = self
            .client
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS attribute lookup failed: {e:?}")))?;

        Ok(resp
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|v| v.parse::<u64>().ok()))
    }
}

#[async_trait]
impl QueueConsumer for SqsConsumer {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        // SQS caps at 10 messages per request.
        let capped = max_messages.min(10) as i32;

        debug!(max_messages = capped, "Polling SQS");

        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(capped)
            .wait_time_seconds(WAIT_TIME_SECS)
            .visibility_timeout(self.visibility_timeout_secs)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS receive failed: {e:?}")))?;

        let received = resp.messages.unwrap_or_default();
        debug!(count = received.len(), "Received SQS messages");

        let messages: Vec<QueueMessage> = received
            .into_iter()
            .filter_map(|msg| {
                let id = msg.message_id().unwrap_or("unknown").to_string();
                let Some(receipt_handle) = msg.receipt_handle().map(str::to_string) else {
                    warn!(message_id = %id, "SQS message without receipt handle, skipping");
                    return None;
                };
                let attr = |name: MessageSystemAttributeName| {
                    msg.attributes().and_then(|attrs| attrs.get(&name)).cloned()
                };

                // SentTimestamp is epoch millis.
                let timestamp = attr(MessageSystemAttributeName::SentTimestamp)
                    .and_then(|ts| ts.parse::<i64>().ok())
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .unwrap_or_else(Utc::now);
                let attempt_count = attr(MessageSystemAttributeName::ApproximateReceiveCount)
                    .and_then(|c| c.parse::<u32>().ok())
                    .unwrap_or(1);

                Some(QueueMessage {
                    id,
                    body: msg.body().unwrap_or_default().to_string(),
                    receipt_handle,
                    timestamp,
                    attempt_count,
                })
            })
            .collect();

        Ok(messages)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        debug!(receipt_handle, "Acking SQS message");

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Ack(format!("SQS delete failed: {e:?}")))?;

        Ok(())
    }

    async fn nack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        debug!(receipt_handle, "Nacking SQS message (visibility=0)");

        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| QueueError::Provider(format!("SQS visibility change failed: {e:?}")))?;

        Ok(())
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        let count = self.approximate_depth(&self.queue_url).await?;
        Ok(QueueHealth {
            connected: true,
            approximate_message_count: count,
            provider: "sqs".to_string(),
        })
    }

    async fn dlq_depth(&self) -> Result<Option<u64>, QueueError> {
        match &self.dlq_url {
            Some(url) => self.approximate_depth(url).await,
            None => Ok(None),
        }
    }
}
