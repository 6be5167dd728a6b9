//! Ingest cycle: fetch → filter → register.
//!
//! Runs at cold start for the configured areas and again as a refill
//! whenever an area's timer group has drained. Failures are isolated per
//! area (fetch) and per event (registration); nothing here aborts siblings.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use shedwatch_core::{AreaId, Event, ShedResult, TimeWindowFilter, TimerHandle};

use crate::registry::TimerRegistry;
use crate::source::EventSource;

/// Timers created by one ingest cycle, keyed by area.
pub type IngestOutcome = BTreeMap<AreaId, Vec<TimerHandle>>;

/// Populates timer groups from the upstream event source.
pub struct Ingestor {
    source: Arc<dyn EventSource>,
    registry: Arc<dyn TimerRegistry>,
    filter: TimeWindowFilter,
}

impl Ingestor {
    pub fn new(source: Arc<dyn EventSource>, registry: Arc<dyn TimerRegistry>) -> Self {
        Self {
            source,
            registry,
            filter: TimeWindowFilter::standard(),
        }
    }

    pub fn with_filter(mut self, filter: TimeWindowFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter(&self) -> &TimeWindowFilter {
        &self.filter
    }

    /// Run one ingest cycle for `areas` against the current time.
    pub async fn ingest(&self, areas: &BTreeSet<AreaId>) -> IngestOutcome {
        self.ingest_at(areas, Utc::now()).await
    }

    /// Run one ingest cycle for `areas`, judging eligibility against `now`.
    ///
    /// When nothing is eligible the registry is not touched at all.
    pub async fn ingest_at(&self, areas: &BTreeSet<AreaId>, now: DateTime<Utc>) -> IngestOutcome {
        info!(areas = ?areas, "Ingest cycle started");

        let fetches = areas.iter().map(|area| async move {
            match self.source.fetch(area).await {
                Ok(events) => {
                    debug!(area = %area, count = events.len(), "Fetched upstream events");
                    events
                }
                Err(e) => {
                    warn!(area = %area, error = %e, "Source fetch failed, area contributes no events");
                    Vec::new()
                }
            }
        });
        let fetched: Vec<Event> = join_all(fetches).await.into_iter().flatten().collect();
        let fetched_count = fetched.len();

        let mut seen = HashSet::new();
        let eligible: Vec<Event> = fetched
            .into_iter()
            .filter(|event| self.filter.is_eligible(event, now))
            .filter(|event| {
                seen.insert((
                    event.area_id.clone(),
                    event.stage.clone(),
                    event.start_time,
                    event.end_time,
                ))
            })
            .collect();

        info!(
            fetched = fetched_count,
            eligible = eligible.len(),
            "Filtered upstream events"
        );

        if eligible.is_empty() {
            info!(areas = ?areas, "No eligible events, timer groups left untouched");
            return IngestOutcome::new();
        }

        let groups: BTreeSet<&str> = eligible.iter().map(|e| e.area_id.as_str()).collect();
        for group in groups {
            if let Err(e) = self.registry.ensure_group(group).await {
                warn!(group, error = %e, "Could not ensure timer group exists");
            }
        }

        let registrations = eligible.into_iter().map(|event| async move {
            let area = event.area_id.clone();
            (area, self.register(event).await)
        });

        let mut outcome = IngestOutcome::new();
        let mut failed = 0usize;
        for (area, result) in join_all(registrations).await {
            match result {
                Ok(handle) => outcome.entry(area).or_default().push(handle),
                Err(e) => {
                    failed += 1;
                    warn!(area = %area, error = %e, "Timer registration failed");
                }
            }
        }

        info!(
            created = outcome.values().map(Vec::len).sum::<usize>(),
            failed,
            backend = self.registry.backend_name(),
            "Ingest cycle complete"
        );
        outcome
    }

    /// Ingest only those of `areas` whose timer group is currently empty.
    ///
    /// Recovers areas whose last refill found nothing to schedule, without
    /// duplicating timers for areas that still have some. Areas whose group
    /// cannot be listed are skipped this round.
    pub async fn reingest_idle(&self, areas: &BTreeSet<AreaId>) -> IngestOutcome {
        let mut idle = BTreeSet::new();
        for area in areas {
            match self.registry.list_pending(area).await {
                Ok(pending) if pending.is_empty() => {
                    idle.insert(area.clone());
                }
                Ok(_) => {}
                Err(e) => warn!(area = %area, error = %e, "Could not list timer group, skipping"),
            }
        }

        if idle.is_empty() {
            debug!("No idle timer groups");
            return IngestOutcome::new();
        }
        info!(areas = ?idle, "Re-ingesting idle timer groups");
        self.ingest(&idle).await
    }

    /// Register a single event without fetching or filtering it.
    pub async fn register_one(&self, event: Event) -> ShedResult<TimerHandle> {
        self.registry.ensure_group(&event.area_id).await?;
        self.register(event).await
    }

    async fn register(&self, mut event: Event) -> ShedResult<TimerHandle> {
        let name = event.generate_timer_name();
        event.assign_timer_name(name.clone())?;
        let fire_at = self.filter.fire_offset(&event);
        let handle = self
            .registry
            .create(&event.area_id, &name, fire_at, &event)
            .await?;
        debug!(group = %handle.group, timer = %handle.name, %fire_at, "Timer registered");
        Ok(handle)
    }
}

/// Something that can repopulate drained timer groups.
#[async_trait]
pub trait RefillTrigger: Send + Sync {
    async fn refill(&self, areas: BTreeSet<AreaId>);
}

#[async_trait]
impl RefillTrigger for Ingestor {
    async fn refill(&self, areas: BTreeSet<AreaId>) {
        let outcome = self.ingest(&areas).await;
        if outcome.is_empty() {
            // Nothing registered means nothing will fire to refill these areas again.
            warn!(areas = ?areas, "Refill registered no timers, areas stay idle until re-ingested");
        }
    }
}
