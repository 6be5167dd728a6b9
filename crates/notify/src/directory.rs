//! Subscriber directory backends.

use std::collections::HashMap;
use std::path::Path;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;

use shedwatch_core::config::{AwsConfig, StorageConfig};
use shedwatch_core::{ShedError, ShedResult, Subscriber};

use crate::traits::SubscriberDirectory;

/// Fixed subscriber list, usually loaded from a JSON file of
/// `[{"area_name": .., "webhookUrl": .., "email": ..}]`.
#[derive(Debug, Clone, Default)]
pub struct StaticSubscriberDirectory {
    by_area: HashMap<String, Vec<Subscriber>>,
}

impl StaticSubscriberDirectory {
    pub fn new(subscribers: Vec<Subscriber>) -> Self {
        let mut by_area: HashMap<String, Vec<Subscriber>> = HashMap::new();
        for sub in subscribers {
            by_area.entry(sub.area_id.clone()).or_default().push(sub);
        }
        Self { by_area }
    }

    pub fn from_json(raw: &str) -> ShedResult<Self> {
        let subscribers: Vec<Subscriber> = serde_json::from_str(raw)
            .map_err(|e| ShedError::Config(format!("invalid subscriber list: {e}")))?;
        Ok(Self::new(subscribers))
    }

    pub fn from_file(path: impl AsRef<Path>) -> ShedResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ShedError::Config(format!("cannot read subscriber file {}: {e}", path.display()))
        })?;
        let directory = Self::from_json(&raw)?;
        tracing::info!(
            path = %path.display(),
            areas = directory.by_area.len(),
            "Loaded static subscriber directory"
        );
        Ok(directory)
    }
}

#[async_trait::async_trait]
impl SubscriberDirectory for StaticSubscriberDirectory {
    async fn lookup(&self, area: &str) -> ShedResult<Vec<Subscriber>> {
        Ok(self.by_area.get(area).cloned().unwrap_or_default())
    }

    fn backend_name(&self) -> &str {
        "static"
    }
}

/// Subscribers stored in DynamoDB, queried through a GSI keyed on `area_name`.
pub struct DynamoSubscriberDirectory {
    client: Client,
    table: String,
    area_index: String,
}

impl DynamoSubscriberDirectory {
    pub fn new(client: Client, table: impl Into<String>, area_index: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
            area_index: area_index.into(),
        }
    }

    /// Fails with [`ShedError::Config`] when `SUBSCRIBERS_TABLE` is unset.
    pub async fn from_config(aws: &AwsConfig, storage: &StorageConfig) -> ShedResult<Self> {
        let table = storage
            .subscribers_table
            .clone()
            .ok_or_else(|| ShedError::Config("SUBSCRIBERS_TABLE must be set".into()))?;
        let sdk_config = aws.load_sdk_config().await;
        tracing::info!(table = %table, index = %storage.subscribers_area_index, "DynamoDB subscriber directory initialized");
        Ok(Self::new(
            Client::new(&sdk_config),
            table,
            storage.subscribers_area_index.clone(),
        ))
    }
}

fn string_attr(item: &HashMap<String, AttributeValue>, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).cloned()
}

/// Decode one directory item. Items without a webhook URL are skipped.
fn subscriber_from_item(area: &str, item: &HashMap<String, AttributeValue>) -> Option<Subscriber> {
    let webhook_url = string_attr(item, "webhookUrl")?;
    Some(Subscriber {
        area_id: string_attr(item, "area_name").unwrap_or_else(|| area.to_string()),
        webhook_url,
        email: string_attr(item, "email"),
    })
}

#[async_trait::async_trait]
impl SubscriberDirectory for DynamoSubscriberDirectory {
    async fn lookup(&self, area: &str) -> ShedResult<Vec<Subscriber>> {
        let mut subscribers = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let resp = self
                .client
                .query()
                .table_name(&self.table)
                .index_name(&self.area_index)
                .key_condition_expression("area_name = :area")
                .expression_attribute_values(":area", AttributeValue::S(area.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| ShedError::Directory {
                    area: area.to_string(),
                    reason: format!("{e:?}"),
                })?;

            for item in resp.items() {
                match subscriber_from_item(area, item) {
                    Some(sub) => subscribers.push(sub),
                    None => tracing::warn!(area, "Skipping subscriber item without webhookUrl"),
                }
            }

            match resp.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        tracing::debug!(area, count = subscribers.len(), "Subscribers looked up");
        Ok(subscribers)
    }

    fn backend_name(&self) -> &str {
        "dynamodb"
    }
}
