//! Outage events and the timer handles they are registered under.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ShedError, ShedResult};

/// Geographic partition key shared by events, subscribers and timer groups.
pub type AreaId = String;

/// One scheduled outage window for an area.
///
/// `start_time < end_time` and a non-empty area hold for every event, whether
/// built with [`Event::new`] or decoded from JSON. The timer name is assigned
/// once, when the event is registered, and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord")]
pub struct Event {
    pub area_id: AreaId,
    pub stage: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timer_name: Option<String>,
}

impl Event {
    pub fn new(
        area_id: impl Into<AreaId>,
        stage: impl Into<String>,
        start_time: DateTime<FixedOffset>,
        end_time: DateTime<FixedOffset>,
        source: impl Into<String>,
    ) -> ShedResult<Self> {
        let area_id = area_id.into();
        if area_id.is_empty() {
            return Err(ShedError::InvalidEvent("empty area id".into()));
        }
        if start_time >= end_time {
            return Err(ShedError::InvalidEvent(format!(
                "start {start_time} is not before end {end_time} (area {area_id})"
            )));
        }
        Ok(Self {
            area_id,
            stage: stage.into(),
            start_time,
            end_time,
            source: source.into(),
            timer_name: None,
        })
    }

    pub fn timer_name(&self) -> Option<&str> {
        self.timer_name.as_deref()
    }

    /// Record the timer this event was registered under.
    ///
    /// Fails if a different name was already assigned.
    pub fn assign_timer_name(&mut self, name: impl Into<String>) -> ShedResult<()> {
        let name = name.into();
        match &self.timer_name {
            Some(existing) if *existing != name => Err(ShedError::InvalidEvent(format!(
                "timer name already assigned: {existing}"
            ))),
            _ => {
                self.timer_name = Some(name);
                Ok(())
            }
        }
    }

    /// Generate a globally unique timer name for this event: `{area}_{uuid}`.
    pub fn generate_timer_name(&self) -> String {
        format!("{}_{}", self.area_id, Uuid::new_v4())
    }
}

/// Unchecked JSON shape of an [`Event`].
#[derive(Deserialize)]
struct EventRecord {
    area_id: AreaId,
    stage: String,
    start_time: DateTime<FixedOffset>,
    end_time: DateTime<FixedOffset>,
    source: String,
    #[serde(default)]
    timer_name: Option<String>,
}

impl TryFrom<EventRecord> for Event {
    type Error = ShedError;

    fn try_from(record: EventRecord) -> ShedResult<Self> {
        let mut event = Event::new(
            record.area_id,
            record.stage,
            record.start_time,
            record.end_time,
            record.source,
        )?;
        if let Some(name) = record.timer_name {
            event.assign_timer_name(name)?;
        }
        Ok(event)
    }
}

/// Reference to a timer held by a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerHandle {
    pub group: String,
    pub name: String,
    /// Provider-side identifier (e.g. a schedule ARN), when the backend has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
}

impl TimerHandle {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            arn: None,
        }
    }
}

/// A timer that has elapsed, as delivered to the fire handlers.
///
/// The wire form is the event JSON carrying its `timer_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer {
    pub event: Event,
    pub name: String,
}

impl FiredTimer {
    pub fn from_event(event: Event) -> ShedResult<Self> {
        let name = event
            .timer_name()
            .map(str::to_string)
            .ok_or_else(|| ShedError::Decode(format!(
                "fired payload for area {} has no timer_name",
                event.area_id
            )))?;
        Ok(Self { event, name })
    }

    pub fn group(&self) -> &str {
        &self.event.area_id
    }

    pub fn handle(&self) -> TimerHandle {
        TimerHandle::new(self.group(), self.name.clone())
    }
}
