use chrono::{Duration, NaiveDateTime};

use crate::models::{BusinessHours, CalendarEvent, TimeSlot};

/// Candidate slots start on this grid, counted from opening time.
pub const SLOT_STEP_MINUTES: i64 = 30;
/// How many alternatives a conversation offers at once.
pub const MAX_SUGGESTIONS: usize = 5;

/// Every slot of `duration_minutes` that fits inside business hours and inside
/// `[window_start, window_end]`, in chronological order. Busy time is not considered.
pub fn candidate_slots(
    hours: &BusinessHours,
    window_start: NaiveDateTime,
    window_end: NaiveDateTime,
    duration_minutes: i64,
) -> Vec<TimeSlot> {
    let mut slots = Vec::new();
    if duration_minutes <= 0 || window_start >= window_end {
        return slots;
    }

    let step = Duration::minutes(SLOT_STEP_MINUTES);
    let Some(length) = Duration::try_minutes(duration_minutes) else {
        return slots;
    };
    let mut day = window_start.date();

    while day <= window_end.date() {
        if hours.is_business_day(day) {
            let close = hours.closes_at(day);
            let mut start = hours.opens_at(day);
            while let Some(end) = start.checked_add_signed(length).filter(|end| *end <= close) {
                if start >= window_start && end <= window_end {
                    if let Some(slot) = TimeSlot::between(start, end) {
                        slots.push(slot);
                    }
                }
                start += step;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    slots
}

/// True when no timed event overlaps `[start, end)`. All-day entries never block.
pub fn is_interval_free(events: &[CalendarEvent], start: NaiveDateTime, end: NaiveDateTime) -> bool {
    !events.iter().any(|event| event.conflicts_with(start, end))
}

/// Candidate slots that do not collide with any of `events`.
pub fn free_slots(
    hours: &BusinessHours,
    events: &[CalendarEvent],
    window_start: NaiveDateTime,
    window_end: NaiveDateTime,
    duration_minutes: i64,
) -> Vec<TimeSlot> {
    candidate_slots(hours, window_start, window_end, duration_minutes)
        .into_iter()
        .filter(|slot| is_interval_free(events, slot.start(), slot.end()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn event(start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: "e1".to_string(),
            title: "Busy".to_string(),
            description: None,
            start: dt(start),
            end: dt(end),
            location: None,
            attendees: Vec::new(),
            all_day: false,
        }
    }

    #[test]
    fn test_slots_follow_the_half_hour_grid() {
        let hours = BusinessHours::default();
        let slots = candidate_slots(&hours, dt("2026-10-20 00:00"), dt("2026-10-21 00:00"), 60);

        // 09:00 through 17:00 starts.
        assert_eq!(slots.len(), 17);
        assert_eq!(slots[0].start(), dt("2026-10-20 09:00"));
        assert_eq!(slots[16].end(), dt("2026-10-20 18:00"));
    }

    #[test]
    fn test_slots_respect_the_window() {
        let hours = BusinessHours::default();
        let slots = candidate_slots(&hours, dt("2026-10-20 14:10"), dt("2026-10-20 16:00"), 30);

        let starts: Vec<_> = slots.iter().map(|s| s.start()).collect();
        assert_eq!(
            starts,
            vec![dt("2026-10-20 14:30"), dt("2026-10-20 15:00"), dt("2026-10-20 15:30")]
        );
    }

    #[test]
    fn test_weekends_have_no_slots() {
        let hours = BusinessHours::default();
        // Saturday and Sunday
        let slots = candidate_slots(&hours, dt("2026-10-24 00:00"), dt("2026-10-26 00:00"), 60);
        assert!(slots.is_empty());
    }

    #[test]
    fn test_degenerate_requests() {
        let hours = BusinessHours::default();
        assert!(candidate_slots(&hours, dt("2026-10-20 09:00"), dt("2026-10-20 18:00"), 0).is_empty());
        assert!(candidate_slots(&hours, dt("2026-10-20 18:00"), dt("2026-10-20 09:00"), 60).is_empty());
        // Longer than the business day
        assert!(candidate_slots(&hours, dt("2026-10-20 00:00"), dt("2026-10-21 00:00"), 600).is_empty());
        assert!(candidate_slots(&hours, dt("2026-10-20 00:00"), dt("2026-10-21 00:00"), i64::MAX).is_empty());
    }

    #[test]
    fn test_half_open_intervals() {
        let events = vec![event("2026-10-20 14:00", "2026-10-20 15:00")];

        assert!(is_interval_free(&events, dt("2026-10-20 15:00"), dt("2026-10-20 16:00")));
        assert!(is_interval_free(&events, dt("2026-10-20 13:00"), dt("2026-10-20 14:00")));
        assert!(!is_interval_free(&events, dt("2026-10-20 14:30"), dt("2026-10-20 15:30")));
        assert!(!is_interval_free(&events, dt("2026-10-20 13:00"), dt("2026-10-20 16:00")));
    }

    #[test]
    fn test_all_day_events_do_not_block() {
        let mut holiday = event("2026-10-20 00:00", "2026-10-21 00:00");
        holiday.all_day = true;
        assert!(is_interval_free(&[holiday], dt("2026-10-20 10:00"), dt("2026-10-20 11:00")));
    }

    #[test]
    fn test_free_slots_skip_busy_time() {
        let hours = BusinessHours::default();
        let events = vec![event("2026-10-20 10:00", "2026-10-20 11:00")];
        let slots = free_slots(&hours, &events, dt("2026-10-20 09:00"), dt("2026-10-20 12:00"), 60);

        let starts: Vec<_> = slots.iter().map(|s| s.start()).collect();
        assert_eq!(starts, vec![dt("2026-10-20 09:00"), dt("2026-10-20 11:00")]);
    }
}
