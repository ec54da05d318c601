pub mod google;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::models::{BookingOutcome, BusinessHours, CalendarEvent, NewEvent, TimeSlot};
use crate::services::availability;

pub use google::GoogleCalendar;
pub use memory::MemoryCalendar;
pub use sqlite::SqliteCalendar;

/// Free/busy source and booking primitive the dialogue books against.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn business_hours(&self) -> &BusinessHours;

    /// Events overlapping `[start, end)`, ordered by start.
    async fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<Vec<CalendarEvent>>;

    /// A rejected booking is `Ok` with `success == false`; `Err` means the backend itself failed.
    async fn create_event(&self, event: NewEvent) -> anyhow::Result<BookingOutcome>;

    /// `false` when no event has that id.
    async fn delete_event(&self, id: &str) -> anyhow::Result<bool>;

    async fn is_free(&self, start: NaiveDateTime, end: NaiveDateTime) -> anyhow::Result<bool> {
        let events = self.list_events(start, end).await?;
        Ok(availability::is_interval_free(&events, start, end))
    }

    /// Free slots of `duration_minutes` in the window, one `list_events` call per search.
    async fn free_slots(
        &self,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        duration_minutes: i64,
    ) -> anyhow::Result<Vec<TimeSlot>> {
        let events = self.list_events(window_start, window_end).await?;
        Ok(availability::free_slots(
            self.business_hours(),
            &events,
            window_start,
            window_end,
            duration_minutes,
        ))
    }
}
