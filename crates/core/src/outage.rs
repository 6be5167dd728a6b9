//! The upstream outage record, `{area_name, stage, start, finsh, source}`.
//!
//! The misspelled `finsh` field (and its corrected `finish` spelling) is only
//! known here. Timers registered by older schedulers fired this same shape
//! with a `scheduleName` key added.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::error::{ShedError, ShedResult};
use crate::event::Event;

/// One record as the upstream API spells it.
#[derive(Debug, Clone, Deserialize)]
pub struct OutageRecord {
    pub area_name: String,
    #[serde(default)]
    pub stage: Option<serde_json::Value>,
    pub start: String,
    #[serde(alias = "finish")]
    pub finsh: String,
    #[serde(default)]
    pub source: Option<String>,
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse an upstream timestamp. Offset-less values are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(raw, fmt)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
    })
}

fn stage_label(stage: Option<serde_json::Value>) -> String {
    match stage {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl OutageRecord {
    pub fn into_event(self) -> ShedResult<Event> {
        let start = parse_timestamp(&self.start)
            .ok_or_else(|| ShedError::Decode(format!("unparseable start: {}", self.start)))?;
        let end = parse_timestamp(&self.finsh)
            .ok_or_else(|| ShedError::Decode(format!("unparseable finish: {}", self.finsh)))?;
        Event::new(
            self.area_name,
            stage_label(self.stage),
            start,
            end,
            self.source.unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_timestamps_are_utc() {
        let ts = parse_timestamp("2026-10-18 12:00:00").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 0);
        assert_eq!(
            parse_timestamp(" 2026-10-18T14:00:00+02:00 ").unwrap().offset().local_minus_utc(),
            7200
        );
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn record_becomes_event() {
        let record: OutageRecord = serde_json::from_str(
            r#"{"area_name":"tshwane-5","stage":6,"start":"2026-10-18T20:00:00+02:00","finish":"2026-10-18T22:30:00+02:00"}"#,
        )
        .unwrap();
        let event = record.into_event().unwrap();
        assert_eq!(event.area_id, "tshwane-5");
        assert_eq!(event.stage, "6");
        assert_eq!(event.source, "");
    }

    #[test]
    fn inverted_record_is_rejected() {
        let record: OutageRecord = serde_json::from_str(
            r#"{"area_name":"a","start":"2026-10-18T18:00:00Z","finsh":"2026-10-18T16:30:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(record.into_event(), Err(ShedError::InvalidEvent(_))));
    }
}
