//! Fired-timer handling: delete the timer, check its group, refill when drained.
//!
//! Each fired timer runs one linear pass:
//!
//! ```text
//! Fired ──delete──▶ CheckGroup ──count > 0──▶ Done
//!                        │
//!                        ├──count == 0──▶ Refill ──▶ Done
//!                        └──list failed──▶ Done (next fire re-checks)
//! ```
//!
//! Two timers of one group firing together may both see an empty group and
//! refill twice. That is redundant, not harmful.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use shedwatch_core::{AreaId, FiredTimer};

use crate::ingest::RefillTrigger;
use crate::registry::TimerRegistry;

/// Result of checking one timer group after its fired timers were removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "remaining")]
pub enum GroupCheck {
    /// Timers remain; nothing else to do.
    Pending(usize),
    /// The group drained and a refill was issued.
    Exhausted,
    /// The group could not be listed; refill deferred to a later fire.
    Unknown,
}

/// What one pass over a set of fired timers did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FireReport {
    pub deleted: usize,
    pub delete_failures: usize,
    pub groups: BTreeMap<String, GroupCheck>,
    pub refilled: BTreeSet<AreaId>,
}

/// Reacts to fired timers and closes the refill loop.
pub struct FireHandler {
    registry: Arc<dyn TimerRegistry>,
    refill: Arc<dyn RefillTrigger>,
}

impl FireHandler {
    pub fn new(registry: Arc<dyn TimerRegistry>, refill: Arc<dyn RefillTrigger>) -> Self {
        Self { registry, refill }
    }

    /// Handle a single fired timer.
    pub async fn handle(&self, fired: &FiredTimer) -> FireReport {
        self.handle_batch(std::slice::from_ref(fired)).await
    }

    /// Handle timers that fired together.
    ///
    /// Every timer is deleted, each distinct group is listed once, and a
    /// single refill is issued covering every group found empty.
    pub async fn handle_batch(&self, fired: &[FiredTimer]) -> FireReport {
        let mut report = FireReport::default();
        if fired.is_empty() {
            return report;
        }

        let deletions = fired.iter().map(|timer| async move {
            let result = self.registry.delete(timer.group(), &timer.name).await;
            (timer, result)
        });
        for (timer, result) in join_all(deletions).await {
            match result {
                Ok(()) => {
                    report.deleted += 1;
                    debug!(group = %timer.group(), timer = %timer.name, "Fired timer deleted");
                }
                Err(e) => {
                    // The provider fires each timer at most once, so a leftover
                    // timer cannot fire again.
                    report.delete_failures += 1;
                    warn!(group = %timer.group(), timer = %timer.name, error = %e, "Failed to delete fired timer");
                }
            }
        }

        let groups: BTreeSet<&str> = fired.iter().map(FiredTimer::group).collect();
        let mut exhausted = BTreeSet::new();
        for group in groups {
            let check = match self.registry.list_pending(group).await {
                Ok(pending) if pending.is_empty() => {
                    exhausted.insert(group.to_string());
                    GroupCheck::Exhausted
                }
                Ok(pending) => {
                    debug!(group, remaining = pending.len(), "Timer group still has pending timers");
                    GroupCheck::Pending(pending.len())
                }
                Err(e) => {
                    warn!(group, error = %e, "Could not list timer group, refill deferred");
                    GroupCheck::Unknown
                }
            };
            report.groups.insert(group.to_string(), check);
        }

        if !exhausted.is_empty() {
            info!(areas = ?exhausted, "Timer groups exhausted, refilling");
            self.refill.refill(exhausted.clone()).await;
            report.refilled = exhausted;
        }

        report
    }
}
