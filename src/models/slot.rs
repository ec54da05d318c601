use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

/// A bookable interval of fixed length. `end == start + duration` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    #[serde(rename = "start_time")]
    start: NaiveDateTime,
    #[serde(rename = "end_time")]
    end: NaiveDateTime,
    duration_minutes: i64,
}

impl TimeSlot {
    pub fn new(start: NaiveDateTime, duration_minutes: i64) -> Option<Self> {
        if duration_minutes <= 0 {
            return None;
        }
        let end = start.checked_add_signed(Duration::try_minutes(duration_minutes)?)?;
        Some(Self {
            start,
            end,
            duration_minutes,
        })
    }

    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        Self::new(start, (end - start).num_minutes())
            .filter(|slot| slot.end == end)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration_minutes
    }
}
