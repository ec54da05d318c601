use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::Connection;

use super::CalendarBackend;
use crate::db::queries;
use crate::models::{BookingOutcome, BusinessHours, CalendarEvent, NewEvent};
use crate::services::timeparse;

/// Persistent local calendar stored in SQLite.
pub struct SqliteCalendar {
    hours: BusinessHours,
    db: Arc<Mutex<Connection>>,
}

impl SqliteCalendar {
    pub fn new(hours: BusinessHours, db: Arc<Mutex<Connection>>) -> Self {
        Self { hours, db }
    }

    fn conn(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }
}

#[async_trait]
impl CalendarBackend for SqliteCalendar {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn business_hours(&self) -> &BusinessHours {
        &self.hours
    }

    async fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<Vec<CalendarEvent>> {
        let db = self.conn()?;
        queries::get_events_in_range(&db, &start, &end)
    }

    async fn create_event(&self, event: NewEvent) -> anyhow::Result<BookingOutcome> {
        if event.start >= event.end {
            return Ok(BookingOutcome::rejected("Start time must be before end time"));
        }

        let db = self.conn()?;
        if queries::has_conflict(&db, &event.start, &event.end)? {
            return Ok(BookingOutcome::rejected(
                "The requested time slot is not available",
            ));
        }

        let stored = CalendarEvent {
            id: uuid::Uuid::new_v4().to_string(),
            title: event.title,
            description: event.description,
            start: event.start,
            end: event.end,
            location: None,
            attendees: event.attendees,
            all_day: false,
        };
        queries::insert_event(&db, &stored)?;

        tracing::info!(event_id = %stored.id, backend = "sqlite", "event created");
        Ok(BookingOutcome::booked(
            stored.id.clone(),
            format!(
                "Appointment '{}' booked for {}",
                stored.title,
                timeparse::format_when(&stored.start)
            ),
        ))
    }

    async fn delete_event(&self, id: &str) -> anyhow::Result<bool> {
        let db = self.conn()?;
        queries::delete_event(&db, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn calendar() -> SqliteCalendar {
        let conn = db::init_db(":memory:").unwrap();
        SqliteCalendar::new(BusinessHours::default(), Arc::new(Mutex::new(conn)))
    }

    fn new_event(start: &str, end: &str) -> NewEvent {
        NewEvent {
            title: "Call".to_string(),
            start: dt(start),
            end: dt(end),
            description: Some("follow-up".to_string()),
            attendees: vec!["sam@example.com".to_string()],
        }
    }

    #[tokio::test]
    async fn test_booking_persists_and_blocks_overlap() {
        let cal = calendar();
        let first = cal
            .create_event(new_event("2026-10-20 10:00", "2026-10-20 11:00"))
            .await
            .unwrap();
        assert!(first.success);

        let overlap = cal
            .create_event(new_event("2026-10-20 10:30", "2026-10-20 11:30"))
            .await
            .unwrap();
        assert!(!overlap.success);

        let adjacent = cal
            .create_event(new_event("2026-10-20 11:00", "2026-10-20 12:00"))
            .await
            .unwrap();
        assert!(adjacent.success);

        let events = cal
            .list_events(dt("2026-10-20 00:00"), dt("2026-10-21 00:00"))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].attendees, vec!["sam@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_free_slots_from_stored_events() {
        let cal = calendar();
        cal.create_event(new_event("2026-10-20 09:00", "2026-10-20 10:00"))
            .await
            .unwrap();

        let slots = cal
            .free_slots(dt("2026-10-20 09:00"), dt("2026-10-20 11:00"), 60)
            .await
            .unwrap();
        let starts: Vec<_> = slots.iter().map(|s| s.start()).collect();
        assert_eq!(starts, vec![dt("2026-10-20 10:00")]);
    }

    #[tokio::test]
    async fn test_delete_event() {
        let cal = calendar();
        let outcome = cal
            .create_event(new_event("2026-10-20 10:00", "2026-10-20 11:00"))
            .await
            .unwrap();
        let id = outcome.event_id.unwrap();
        assert!(cal.delete_event(&id).await.unwrap());
        assert!(!cal.delete_event("missing").await.unwrap());
    }
}
