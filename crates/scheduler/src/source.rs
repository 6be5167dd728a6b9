//! Upstream outage feed.
//!
//! The upstream API answers `GET {base}/outages/{area}` with a JSON array of
//! `{area_name, stage, start, finsh, source}` records, decoded through
//! [`OutageRecord`]; everything past this module works with [`Event`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use shedwatch_core::config::SourceConfig;
use shedwatch_core::{Event, OutageRecord, ShedError, ShedResult};

/// Source of known future outage events for an area.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch(&self, area: &str) -> ShedResult<Vec<Event>>;
}

/// Decode an upstream response body into events.
///
/// A body that is not a JSON array of records is an error. Individual records
/// with bad timestamps or an inverted window are skipped with a warning.
pub fn decode_outages(area: &str, body: &str) -> ShedResult<Vec<Event>> {
    let records: Vec<OutageRecord> = serde_json::from_str(body).map_err(|e| ShedError::SourceFetch {
        area: area.to_string(),
        reason: format!("malformed body: {e}"),
    })?;

    let total = records.len();
    let events: Vec<Event> = records
        .into_iter()
        .filter_map(|raw| match raw.into_event() {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(area, error = %e, "Skipping upstream outage record");
                None
            }
        })
        .collect();

    debug!(area, total, decoded = events.len(), "Decoded upstream outages");
    Ok(events)
}

/// Decode a single upstream record (e.g. one supplied by an operator).
pub fn decode_outage(body: &str) -> ShedResult<Event> {
    let raw: OutageRecord = serde_json::from_str(body)
        .map_err(|e| ShedError::Decode(format!("malformed outage record: {e}")))?;
    raw.into_event()
}

/// [`EventSource`] backed by the upstream REST API.
pub struct HttpEventSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEventSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ShedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShedError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &SourceConfig) -> ShedResult<Self> {
        Self::new(config.base_url.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn outages_url(&self, area: &str) -> String {
        format!("{}/outages/{}", self.base_url, area)
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn fetch(&self, area: &str) -> ShedResult<Vec<Event>> {
        let url = self.outages_url(area);
        let fetch_err = |reason: String| ShedError::SourceFetch {
            area: area.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_err(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("{url} returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| fetch_err(format!("reading body from {url} failed: {e}")))?;

        decode_outages(area, &body)
    }
}
