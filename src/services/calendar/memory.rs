use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use super::CalendarBackend;
use crate::models::{BookingOutcome, BusinessHours, CalendarEvent, NewEvent};
use crate::services::{availability, timeparse};

/// Deterministic in-process calendar for development and tests.
pub struct MemoryCalendar {
    hours: BusinessHours,
    events: Mutex<Vec<CalendarEvent>>,
}

impl MemoryCalendar {
    pub fn new(hours: BusinessHours) -> Self {
        Self {
            hours,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Pre-populated with a fixed set of busy intervals on the days after `today`.
    pub fn seeded(hours: BusinessHours, today: NaiveDate) -> Self {
        let seeds = [
            (1, (10, 0), (11, 0), "Team Meeting", "Weekly team sync"),
            (1, (14, 0), (15, 0), "Client Call", "Project discussion"),
            (2, (12, 0), (13, 0), "Lunch Break", "Lunch with colleagues"),
            (3, (9, 0), (10, 30), "Product Review", "Monthly product review"),
        ];

        let events = seeds
            .iter()
            .enumerate()
            .filter_map(|(i, (offset, from, to, title, description))| {
                let day = today + Duration::days(*offset);
                Some(CalendarEvent {
                    id: format!("seed-{i}"),
                    title: title.to_string(),
                    description: Some(description.to_string()),
                    start: day.and_time(NaiveTime::from_hms_opt(from.0, from.1, 0)?),
                    end: day.and_time(NaiveTime::from_hms_opt(to.0, to.1, 0)?),
                    location: None,
                    attendees: Vec::new(),
                    all_day: false,
                })
            })
            .collect();

        Self {
            hours,
            events: Mutex::new(events),
        }
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Vec<CalendarEvent>>> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("memory calendar lock poisoned"))
    }
}

#[async_trait]
impl CalendarBackend for MemoryCalendar {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn business_hours(&self) -> &BusinessHours {
        &self.hours
    }

    async fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<Vec<CalendarEvent>> {
        let events = self.lock()?;
        let mut found: Vec<CalendarEvent> = events
            .iter()
            .filter(|e| e.overlaps(start, end))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.start);
        Ok(found)
    }

    async fn create_event(&self, event: NewEvent) -> anyhow::Result<BookingOutcome> {
        if event.start >= event.end {
            return Ok(BookingOutcome::rejected("Start time must be before end time"));
        }

        // Checked and inserted under one lock so two bookings cannot both win.
        let mut events = self.lock()?;
        if !availability::is_interval_free(&events, event.start, event.end) {
            return Ok(BookingOutcome::rejected(
                "The requested time slot is not available",
            ));
        }

        let id = format!("evt-{}", uuid::Uuid::new_v4());
        let message = format!(
            "Appointment '{}' booked for {}",
            event.title,
            timeparse::format_when(&event.start)
        );
        events.push(CalendarEvent {
            id: id.clone(),
            title: event.title,
            description: event.description,
            start: event.start,
            end: event.end,
            location: None,
            attendees: event.attendees,
            all_day: false,
        });

        tracing::info!(event_id = %id, backend = "memory", "event created");
        Ok(BookingOutcome::booked(id, message))
    }

    async fn delete_event(&self, id: &str) -> anyhow::Result<bool> {
        let mut events = self.lock()?;
        let before = events.len();
        events.retain(|e| e.id != id);
        Ok(events.len() != before)
    }
}
