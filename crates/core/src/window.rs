//! Scheduling window rules: which events are still worth a timer, and when
//! that timer fires.

use chrono::{DateTime, Duration, FixedOffset, SubsecRound, Utc};

use crate::event::Event;

/// Eligibility and fire-time derivation for outage events.
///
/// With the standard settings an event is eligible when it starts at least
/// one hour from now, and its timer fires one hour after the window opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindowFilter {
    /// Minimum distance between now and the event start.
    pub min_lead: Duration,
    /// Offset added to the event start to get the fire time.
    pub fire_delay: Duration,
}

impl TimeWindowFilter {
    pub fn standard() -> Self {
        Self {
            min_lead: Duration::hours(1),
            fire_delay: Duration::hours(1),
        }
    }

    /// True iff `event.start_time - now >= min_lead`.
    pub fn is_eligible(&self, event: &Event, now: DateTime<Utc>) -> bool {
        event.start_time.signed_duration_since(now) >= self.min_lead
    }

    /// Fire time for the event's timer, truncated to whole seconds.
    ///
    /// Keeps the event's own offset; zone handling belongs to the timer provider.
    pub fn fire_offset(&self, event: &Event) -> DateTime<FixedOffset> {
        (event.start_time + self.fire_delay).trunc_subsecs(0)
    }
}

impl Default for TimeWindowFilter {
    fn default() -> Self {
        Self::standard()
    }
}

/// One-shot schedule expression, `at(YYYY-MM-DDTHH:MM:SS)`, in the wall-clock
/// time of the given instant.
pub fn schedule_expression(fire_at: &DateTime<FixedOffset>) -> String {
    format!("at({})", fire_at.format("%Y-%m-%dT%H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_starting_at(start: DateTime<FixedOffset>) -> Event {
        Event::new("area", "Stage 2", start, start + Duration::hours(2), "test").unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn eligible_boundary_is_exactly_one_hour() {
        let filter = TimeWindowFilter::standard();
        let now = now();
        let offset = FixedOffset::east_opt(0).unwrap();

        let at_one_hour = event_starting_at((now + Duration::hours(1)).with_timezone(&offset));
        assert!(filter.is_eligible(&at_one_hour, now));

        let just_short = event_starting_at(
            (now + Duration::minutes(59) + Duration::seconds(59)).with_timezone(&offset),
        );
        assert!(!filter.is_eligible(&just_short, now));
    }

    #[test]
    fn past_events_are_not_eligible() {
        let filter = TimeWindowFilter::standard();
        let offset = FixedOffset::east_opt(0).unwrap();
        let past = event_starting_at((now() - Duration::hours(3)).with_timezone(&offset));
        assert!(!filter.is_eligible(&past, now()));
    }

    #[test]
    fn eligibility_ignores_offset_representation() {
        // 12:00+02:00 is 10:00Z, i.e. exactly now.
        let filter = TimeWindowFilter::standard();
        let sast = FixedOffset::east_opt(2 * 3600).unwrap();
        let start = DateTime::parse_from_rfc3339("2026-10-18T12:00:00+02:00").unwrap();
        assert!(!filter.is_eligible(&event_starting_at(start), now()));

        let later = DateTime::parse_from_rfc3339("2026-10-18T13:00:00+02:00").unwrap();
        assert_eq!(later.offset(), &sast);
        assert!(filter.is_eligible(&event_starting_at(later), now()));
    }

    #[test]
    fn fire_offset_is_one_hour_after_start() {
        let filter = TimeWindowFilter::standard();
        let start = DateTime::parse_from_rfc3339("2026-10-18T14:00:00+02:00").unwrap();
        let event = event_starting_at(start);

        let fire = filter.fire_offset(&event);
        assert_eq!(fire, start + Duration::hours(1));
        assert_eq!(fire.offset(), start.offset());
        // Repeated computation yields the same instant.
        assert_eq!(filter.fire_offset(&event), fire);
    }

    #[test]
    fn fire_offset_drops_subseconds() {
        let filter = TimeWindowFilter::standard();
        let start = DateTime::parse_from_rfc3339("2026-10-18T14:00:00.750+02:00").unwrap();
        let fire = filter.fire_offset(&event_starting_at(start));
        assert_eq!(
            fire,
            DateTime::parse_from_rfc3339("2026-10-18T15:00:00+02:00").unwrap()
        );
    }

    #[test]
    fn expression_uses_wall_clock_seconds() {
        let fire = DateTime::parse_from_rfc3339("2026-10-18T15:00:00+02:00").unwrap();
        assert_eq!(schedule_expression(&fire), "at(2026-10-18T15:00:00)");
    }
}
