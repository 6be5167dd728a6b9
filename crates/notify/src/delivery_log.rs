//! Delivery audit log: storage backends and the fire-and-forget writer.
//!
//! The dispatcher never waits on log storage. Records are handed to a
//! [`DeliveryLogWriter`], which queues them on a bounded channel drained by a
//! background task. Storage failures and a full queue are logged and dropped.

use std::sync::{Arc, Mutex};

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shedwatch_core::config::{AwsConfig, StorageConfig};
use shedwatch_core::{DeliveryRecord, ShedError, ShedResult};

use crate::traits::DeliveryLog;

// ── Backends ────────────────────────────────────────────────────────

/// Emits each record as a structured log line and keeps nothing.
#[derive(Debug, Default)]
pub struct TracingDeliveryLog;

#[async_trait::async_trait]
impl DeliveryLog for TracingDeliveryLog {
    async fn record(&self, record: DeliveryRecord) -> ShedResult<()> {
        info!(
            id = %record.id,
            timestamp = %record.timestamp,
            url = %record.webhook_url,
            status = record.response_status,
            area = %record.request_payload.area_id,
            timer = record.request_payload.timer_name().unwrap_or_default(),
            response = %record.response_body,
            "Delivery recorded"
        );
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "log"
    }
}

/// Keeps every record in process memory. Unbounded; meant for tests and
/// short-lived tools.
#[derive(Debug, Default)]
pub struct InMemoryDeliveryLog {
    records: Mutex<Vec<DeliveryRecord>>,
}

impl InMemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DeliveryRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl DeliveryLog for InMemoryDeliveryLog {
    async fn record(&self, record: DeliveryRecord) -> ShedResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// Writes one DynamoDB item per delivery attempt.
pub struct DynamoDeliveryLog {
    client: Client,
    table: String,
}

impl DynamoDeliveryLog {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// Fails with [`ShedError::Config`] when `LOGS_TABLE` is unset.
    pub async fn from_config(aws: &AwsConfig, storage: &StorageConfig) -> ShedResult<Self> {
        let table = storage
            .logs_table
            .clone()
            .ok_or_else(|| ShedError::Config("LOGS_TABLE must be set".into()))?;
        let sdk_config = aws.load_sdk_config().await;
        tracing::info!(table = %table, "DynamoDB delivery log initialized");
        Ok(Self::new(Client::new(&sdk_config), table))
    }
}

/// Item attributes for one record. `timestamp` is epoch milliseconds as a
/// string; payload and response are stored as JSON text.
fn record_item(record: &DeliveryRecord) -> ShedResult<Vec<(&'static str, AttributeValue)>> {
    let payload = serde_json::to_string(&record.request_payload)
        .map_err(|e| ShedError::LogWrite(format!("failed to serialize payload: {e}")))?;
    Ok(vec![
        ("id", AttributeValue::S(record.id.to_string())),
        (
            "timestamp",
            AttributeValue::S(record.timestamp.timestamp_millis().to_string()),
        ),
        ("webhookUrl", AttributeValue::S(record.webhook_url.clone())),
        (
            "responseStatus",
            AttributeValue::N(record.response_status.to_string()),
        ),
        ("responseData", AttributeValue::S(record.response_body.clone())),
        ("requestPayload", AttributeValue::S(payload)),
    ])
}

#[async_trait::async_trait]
impl DeliveryLog for DynamoDeliveryLog {
    async fn record(&self, record: DeliveryRecord) -> ShedResult<()> {
        let mut request = self.client.put_item().table_name(&self.table);
        for (key, value) in record_item(&record)? {
            request = request.item(key, value);
        }
        request
            .send()
            .await
            .map_err(|e| ShedError::LogWrite(format!("{e:?}")))?;
        debug!(id = %record.id, status = record.response_status, "Delivery record stored");
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "dynamodb"
    }
}

// ── Writer ──────────────────────────────────────────────────────────

/// Non-blocking front for a [`DeliveryLog`].
pub struct DeliveryLogWriter {
    tx: Mutex<Option<mpsc::Sender<DeliveryRecord>>>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryLogWriter {
    /// Start the background drain task. Must be called inside a tokio runtime.
    pub fn spawn(log: Arc<dyn DeliveryLog>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<DeliveryRecord>(capacity.max(1));
        let drain = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let id = record.id;
                if let Err(e) = log.record(record).await {
                    warn!(id = %id, backend = log.backend_name(), error = %e, "Delivery log write failed");
                }
            }
            debug!("Delivery log writer drained");
        });
        Self {
            tx: Mutex::new(Some(tx)),
            drain: Mutex::new(Some(drain)),
        }
    }

    /// Queue a record. Never blocks and never fails the caller.
    pub fn submit(&self, record: DeliveryRecord) {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            warn!(id = %record.id, "Delivery log writer closed, record dropped");
            return;
        };
        if let Err(e) = tx.try_send(record) {
            let reason = match &e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            let record = e.into_inner();
            warn!(id = %record.id, url = %record.webhook_url, reason, "Delivery record dropped");
        }
    }

    /// Stop accepting records and wait until every queued record was written.
    pub async fn close(&self) {
        drop(self.tx.lock().unwrap_or_else(|e| e.into_inner()).take());
        let drain = self.drain.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = drain {
            if let Err(e) = handle.await {
                warn!(error = %e, "Delivery log drain task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};
    use shedwatch_core::{Event, TRANSPORT_FAILURE_STATUS};

    fn record(status: i32) -> DeliveryRecord {
        let start = DateTime::parse_from_rfc3339("2026-10-18T14:00:00+02:00").unwrap();
        let event = Event::new("jhb-3", "Stage 2", start, start + Duration::hours(2), "s").unwrap();
        DeliveryRecord::new("https://h.example", status, "body", event)
    }

    struct FailingLog;

    #[async_trait::async_trait]
    impl DeliveryLog for FailingLog {
        async fn record(&self, _record: DeliveryRecord) -> ShedResult<()> {
            Err(ShedError::LogWrite("table missing".into()))
        }
        fn backend_name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn close_flushes_queued_records() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let writer = DeliveryLogWriter::spawn(log.clone(), 16);
        writer.submit(record(200));
        writer.submit(record(TRANSPORT_FAILURE_STATUS));
        writer.close().await;

        let stored = log.records();
        assert_eq!(stored.len(), 2);
        assert!(stored[1].is_transport_failure());
    }

    #[tokio::test]
    async fn submit_after_close_is_dropped() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let writer = DeliveryLogWriter::spawn(log.clone(), 4);
        writer.close().await;
        writer.submit(record(200));
        writer.close().await;
        assert!(log.records().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_absorbed() {
        let writer = DeliveryLogWriter::spawn(Arc::new(FailingLog), 4);
        writer.submit(record(500));
        writer.close().await;
    }

    #[tokio::test]
    async fn tracing_log_accepts_every_record() {
        let writer = DeliveryLogWriter::spawn(Arc::new(TracingDeliveryLog), 4);
        writer.submit(record(200));
        writer.submit(record(TRANSPORT_FAILURE_STATUS));
        writer.close().await;
        assert!(TracingDeliveryLog.record(record(500)).await.is_ok());
        assert_eq!(TracingDeliveryLog.backend_name(), "log");
    }

    #[test]
    fn dynamo_item_layout() {
        let rec = record(500);
        let item: std::collections::HashMap<_, _> = record_item(&rec).unwrap().into_iter().collect();
        assert_eq!(item["id"], AttributeValue::S(rec.id.to_string()));
        assert_eq!(item["responseStatus"], AttributeValue::N("500".into()));
        assert_eq!(item["responseData"], AttributeValue::S("body".into()));
        assert_eq!(
            item["timestamp"],
            AttributeValue::S(rec.timestamp.timestamp_millis().to_string())
        );
        let payload: Event = match &item["requestPayload"] {
            AttributeValue::S(s) => serde_json::from_str(s).unwrap(),
            other => panic!("expected string payload, got {other:?}"),
        };
        assert_eq!(payload, rec.request_payload);
    }
}
