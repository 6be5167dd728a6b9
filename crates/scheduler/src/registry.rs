//! One-shot timer registry abstraction and an in-process backend.
//!
//! A registry stores timers in named groups, one group per area. The
//! registry is the only record of which events are still pending: a group
//! with no timers left is "exhausted" and due for a refill.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use shedwatch_core::{Event, FiredTimer, ShedError, ShedResult, TimerHandle};

/// Durable one-shot timer service, scoped by group.
#[async_trait]
pub trait TimerRegistry: Send + Sync {
    /// Register a timer that fires at `fire_at` and delivers `payload`.
    async fn create(
        &self,
        group: &str,
        name: &str,
        fire_at: DateTime<FixedOffset>,
        payload: &Event,
    ) -> ShedResult<TimerHandle>;

    /// Remove a timer. Removing a timer that no longer exists succeeds.
    async fn delete(&self, group: &str, name: &str) -> ShedResult<()>;

    /// Timers still pending in `group`.
    async fn list_pending(&self, group: &str) -> ShedResult<Vec<TimerHandle>>;

    /// Make sure `group` exists before timers are created in it.
    async fn ensure_group(&self, _group: &str) -> ShedResult<()> {
        Ok(())
    }

    /// Backend name for logs (e.g. "memory", "eventbridge").
    fn backend_name(&self) -> &str;
}

#[derive(Debug, Clone)]
struct PendingTimer {
    fire_at: DateTime<FixedOffset>,
    payload: Event,
}

/// Timer registry held in process memory.
///
/// Used for local runs and tests. Nothing fires on its own: callers drain
/// due timers with [`InMemoryTimerRegistry::take_due`].
#[derive(Default)]
pub struct InMemoryTimerRegistry {
    groups: Mutex<HashMap<String, BTreeMap<String, PendingTimer>>>,
}

impl InMemoryTimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending timers in a group.
    pub fn pending_count(&self, group: &str) -> usize {
        let guard = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(group).map(|timers| timers.len()).unwrap_or(0)
    }

    /// Timers due at or before `now`, earliest first, as fired payloads.
    ///
    /// Timers stay registered; the fire handler deletes them, as it would
    /// for a provider-managed timer.
    pub fn take_due(&self, now: DateTime<FixedOffset>) -> Vec<FiredTimer> {
        let guard = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        let mut due: Vec<&PendingTimer> = guard
            .values()
            .flat_map(|timers| timers.values())
            .filter(|t| t.fire_at <= now)
            .collect();
        due.sort_by_key(|t| t.fire_at);
        due.into_iter()
            .filter_map(|t| FiredTimer::from_event(t.payload.clone()).ok())
            .collect()
    }

    /// Fire time of a registered timer.
    pub fn fire_time(&self, group: &str, name: &str) -> Option<DateTime<FixedOffset>> {
        let guard = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(group)?.get(name).map(|t| t.fire_at)
    }
}

#[async_trait]
impl TimerRegistry for InMemoryTimerRegistry {
    async fn create(
        &self,
        group: &str,
        name: &str,
        fire_at: DateTime<FixedOffset>,
        payload: &Event,
    ) -> ShedResult<TimerHandle> {
        let mut guard = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        let timers = guard.entry(group.to_string()).or_default();
        if timers.contains_key(name) {
            return Err(ShedError::Registration {
                group: group.to_string(),
                name: name.to_string(),
                reason: "timer already exists".into(),
            });
        }
        timers.insert(
            name.to_string(),
            PendingTimer {
                fire_at,
                payload: payload.clone(),
            },
        );
        Ok(TimerHandle::new(group, name))
    }

    async fn delete(&self, group: &str, name: &str) -> ShedResult<()> {
        let mut guard = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(timers) = guard.get_mut(group) {
            timers.remove(name);
        }
        Ok(())
    }

    async fn list_pending(&self, group: &str) -> ShedResult<Vec<TimerHandle>> {
        let guard = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard
            .get(group)
            .map(|timers| {
                timers
                    .keys()
                    .map(|name| TimerHandle::new(group, name.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(area: &str, start: &str) -> Event {
        let start = DateTime::parse_from_rfc3339(start).unwrap();
        Event::new(area, "Stage 3", start, start + Duration::hours(2), "test").unwrap()
    }

    #[tokio::test]
    async fn create_list_delete() {
        let registry = InMemoryTimerRegistry::new();
        let mut e = event("a", "2026-10-18T14:00:00+02:00");
        e.assign_timer_name("a_1").unwrap();

        let handle = registry
            .create("a", "a_1", e.start_time + Duration::hours(1), &e)
            .await
            .unwrap();
        assert_eq!(handle, TimerHandle::new("a", "a_1"));
        assert_eq!(registry.list_pending("a").await.unwrap().len(), 1);
        assert!(registry.list_pending("b").await.unwrap().is_empty());

        registry.delete("a", "a_1").await.unwrap();
        assert_eq!(registry.pending_count("a"), 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let registry = InMemoryTimerRegistry::new();
        registry.delete("missing", "nope").await.unwrap();
        registry.delete("missing", "nope").await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let registry = InMemoryTimerRegistry::new();
        let e = event("a", "2026-10-18T14:00:00+02:00");
        registry.create("a", "a_1", e.start_time, &e).await.unwrap();
        let err = registry.create("a", "a_1", e.start_time, &e).await.unwrap_err();
        assert!(matches!(err, ShedError::Registration { .. }));
    }

    #[tokio::test]
    async fn take_due_orders_by_fire_time() {
        let registry = InMemoryTimerRegistry::new();
        let mut late = event("a", "2026-10-18T16:00:00+02:00");
        late.assign_timer_name("a_late").unwrap();
        let mut early = event("b", "2026-10-18T14:00:00+02:00");
        early.assign_timer_name("b_early").unwrap();

        registry.create("a", "a_late", late.start_time, &late).await.unwrap();
        registry.create("b", "b_early", early.start_time, &early).await.unwrap();

        let now = DateTime::parse_from_rfc3339("2026-10-18T15:00:00+02:00").unwrap();
        let due = registry.take_due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].name, "b_early");

        let later = DateTime::parse_from_rfc3339("2026-10-18T17:00:00+02:00").unwrap();
        let due: Vec<_> = registry.take_due(later).into_iter().map(|f| f.name).collect();
        assert_eq!(due, vec!["b_early", "a_late"]);
    }
}
