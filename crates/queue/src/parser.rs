//! Parse queue message bodies into [`FiredTimer`]s.
//!
//! A body is the JSON the timer was registered with: the event plus its
//! `timer_name`. Timers registered by older schedulers fire the upstream
//! record shape (`area_name`, `start`, `finsh`) with the name under
//! `scheduleName`; those decode through [`OutageRecord`].

use serde_json::Value;
use tracing::warn;

use shedwatch_core::{Event, FiredTimer, OutageRecord};

use crate::consumer::QueueMessage;
use crate::error::QueueError;

/// Alternative field names for the timer name.
const TIMER_NAME_KEYS: &[&str] = &["timer_name", "timerName", "scheduleName"];

/// Parse a single message body into a [`FiredTimer`].
///
/// Rejects bodies that are not a JSON object, do not decode as an event,
/// or carry no timer name.
pub fn parse_message(msg: &QueueMessage) -> Result<FiredTimer, QueueError> {
    let json: Value = serde_json::from_str(&msg.body)
        .map_err(|e| QueueError::Parse(format!("Invalid JSON in message {}: {}", msg.id, e)))?;

    let obj = json
        .as_object()
        .ok_or_else(|| QueueError::Parse(format!("Message {} body is not a JSON object", msg.id)))?;

    let name = TIMER_NAME_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| QueueError::Parse(format!("Message {} carries no timer name", msg.id)))?;

    let mut event = if obj.contains_key("area_name") && !obj.contains_key("area_id") {
        serde_json::from_value::<OutageRecord>(json)
            .map_err(|e| e.to_string())
            .and_then(|record| record.into_event().map_err(|e| e.to_string()))
    } else {
        serde_json::from_value::<Event>(json).map_err(|e| e.to_string())
    }
    .map_err(|e| QueueError::Parse(format!("Message {} is not a fired event: {}", msg.id, e)))?;

    event
        .assign_timer_name(name)
        .map_err(|e| QueueError::Parse(format!("Message {}: {}", msg.id, e)))?;
    FiredTimer::from_event(event).map_err(|e| QueueError::Parse(format!("Message {}: {}", msg.id, e)))
}

/// Parse a batch of messages, separating successes from failures.
///
/// Returns `(fired, errors)`: each parsed timer paired with the index of its
/// message, and `(message id, error)` for the rest. Good messages are never
/// blocked by bad ones.
pub fn parse_batch(messages: &[QueueMessage]) -> (Vec<(usize, FiredTimer)>, Vec<(String, QueueError)>) {
    let mut fired = Vec::with_capacity(messages.len());
    let mut errors = Vec::new();

    for (idx, msg) in messages.iter().enumerate() {
        match parse_message(msg) {
            Ok(timer) => fired.push((idx, timer)),
            Err(e) => {
                warn!(message_id = %msg.id, error = %e, "Failed to parse queue message");
                errors.push((msg.id.clone(), e));
            }
        }
    }

    (fired, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn make_msg(id: &str, body: &str) -> QueueMessage {
        QueueMessage {
            id: id.to_string(),
            body: body.to_string(),
            receipt_handle: format!("handle-{id}"),
            timestamp: Utc::now(),
            attempt_count: 1,
        }
    }

    const FIRED: &str = r#"{
        "area_id": "city-of-cape-town-area-15",
        "stage": "Stage 4",
        "start_time": "2026-10-18T14:00:00+02:00",
        "end_time": "2026-10-18T16:30:00+02:00",
        "source": "https://twitter.com/Eskom_SA",
        "timer_name": "city-of-cape-town-area-15_5f0c"
    }"#;

    #[test]
    fn parses_registered_payload() {
        let fired = parse_message(&make_msg("m1", FIRED)).unwrap();
        assert_eq!(fired.name, "city-of-cape-town-area-15_5f0c");
        assert_eq!(fired.group(), "city-of-cape-town-area-15");
        assert_eq!(
            fired.event.start_time,
            DateTime::parse_from_rfc3339("2026-10-18T14:00:00+02:00").unwrap()
        );
    }

    #[test]
    fn accepts_camel_case_timer_name() {
        let body = FIRED.replace("\"timer_name\"", "\"timerName\"");
        let fired = parse_message(&make_msg("m2", &body)).unwrap();
        assert_eq!(fired.event.timer_name(), Some("city-of-cape-town-area-15_5f0c"));
    }

    #[test]
    fn decodes_legacy_upstream_shape() {
        let body = r#"{
            "area_name": "city-of-cape-town-area-15",
            "stage": "Stage 4",
            "start": "2026-10-18T14:00:00+02:00",
            "finsh": "2026-10-18T16:30:00+02:00",
            "source": "https://twitter.com/Eskom_SA",
            "scheduleName": "city-of-cape-town-area-15_9d1e"
        }"#;
        let fired = parse_message(&make_msg("legacy", body)).unwrap();
        assert_eq!(fired.name, "city-of-cape-town-area-15_9d1e");
        assert_eq!(fired.group(), "city-of-cape-town-area-15");
        assert_eq!(fired.event.stage, "Stage 4");
        assert_eq!(
            fired.event.end_time,
            DateTime::parse_from_rfc3339("2026-10-18T16:30:00+02:00").unwrap()
        );
    }

    #[test]
    fn rejects_inverted_window() {
        let body = FIRED.replace("16:30:00", "12:00:00");
        let err = parse_message(&make_msg("m4", &body)).unwrap_err();
        assert!(matches!(err, QueueError::Parse(ref m) if m.contains("not before end")));

        let legacy = r#"{"area_name":"a","start":"2026-10-18T16:00:00+02:00","finsh":"2026-10-18T14:00:00+02:00","scheduleName":"a_1"}"#;
        assert!(parse_message(&make_msg("m5", legacy)).is_err());
    }

    #[test]
    fn rejects_payload_without_timer_name() {
        let body = FIRED.replace("\"timer_name\": \"city-of-cape-town-area-15_5f0c\"", "\"x\": 1");
        let err = parse_message(&make_msg("m3", &body)).unwrap_err();
        assert!(matches!(err, QueueError::Parse(_)));
    }

    #[test]
    fn rejects_non_objects_and_bad_json() {
        assert!(parse_message(&make_msg("a", "[1,2]")).is_err());
        assert!(parse_message(&make_msg("b", "{not json")).is_err());
        assert!(parse_message(&make_msg("c", r#"{"area_id":"x"}"#)).is_err());
    }

    #[test]
    fn batch_keeps_good_messages() {
        let messages = vec![
            make_msg("ok-1", FIRED),
            make_msg("bad", "nope"),
            make_msg("ok-2", FIRED),
        ];
        let (fired, errors) = parse_batch(&messages);
        assert_eq!(fired.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "bad");
    }
}
