use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::CalendarBackend;
use crate::models::{BookingOutcome, BusinessHours, CalendarEvent, NewEvent};
use crate::services::timeparse;

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_DESCRIPTION: &str = "Appointment booked via chat assistant";

/// Google Calendar v3 over REST. Naive times are exchanged as UTC.
///
/// There is no server-side conflict check on insert, so two sessions booking the
/// same slot at the same moment can both succeed.
pub struct GoogleCalendar {
    hours: BusinessHours,
    calendar_id: String,
    access_token: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    status: Option<String>,
    start: EventTime,
    end: EventTime,
    #[serde(default)]
    attendees: Vec<Attendee>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Attendee {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct InsertEvent<'a> {
    summary: &'a str,
    description: &'a str,
    start: EventTime,
    end: EventTime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attendees: Vec<Attendee>,
}

impl EventTime {
    fn utc(at: &NaiveDateTime) -> Self {
        Self {
            date_time: Some(at.format("%Y-%m-%dT%H:%M:%S").to_string()),
            date: None,
            time_zone: Some("UTC".to_string()),
        }
    }

    /// `(instant, all_day)`
    fn resolve(&self) -> Option<(NaiveDateTime, bool)> {
        if let Some(value) = &self.date_time {
            let at = DateTime::parse_from_rfc3339(value)
                .map(|dt| dt.naive_utc())
                .ok()
                .or_else(|| timeparse::parse_local_datetime(value))?;
            return Some((at, false));
        }
        let day = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some((day.and_hms_opt(0, 0, 0)?, true))
    }
}

impl GoogleEvent {
    fn into_event(self) -> Option<CalendarEvent> {
        if self.status.as_deref() == Some("cancelled") {
            return None;
        }
        let (start, all_day) = self.start.resolve()?;
        let (end, _) = self.end.resolve()?;

        Some(CalendarEvent {
            id: self.id,
            title: self.summary.unwrap_or_else(|| "(busy)".to_string()),
            description: self.description,
            start,
            end,
            location: self.location,
            attendees: self.attendees.into_iter().filter_map(|a| a.email).collect(),
            all_day,
        })
    }
}

impl GoogleCalendar {
    pub fn new(hours: BusinessHours, calendar_id: String, access_token: String) -> Self {
        Self {
            hours,
            calendar_id,
            access_token,
            base_url: API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn events_url(&self, event_id: Option<&str>) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.base_url).context("invalid calendar API base url")?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("calendar API base url cannot be a base"))?;
            segments.extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }
}

fn rfc3339_utc(at: &NaiveDateTime) -> String {
    format!("{}Z", at.format("%Y-%m-%dT%H:%M:%S"))
}

#[async_trait]
impl CalendarBackend for GoogleCalendar {
    fn name(&self) -> &'static str {
        "google"
    }

    fn business_hours(&self) -> &BusinessHours {
        &self.hours
    }

    async fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<Vec<CalendarEvent>> {
        let resp = self
            .client
            .get(self.events_url(None)?)
            .bearer_auth(&self.access_token)
            .query(&[
                ("timeMin", rfc3339_utc(&start)),
                ("timeMax", rfc3339_utc(&end)),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .context("failed to call Google Calendar API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Google Calendar error ({status}): {body}");
        }

        let list: EventList = resp
            .json()
            .await
            .context("failed to parse Google Calendar events")?;

        let mut events: Vec<CalendarEvent> = list
            .items
            .into_iter()
            .filter_map(GoogleEvent::into_event)
            .collect();
        events.sort_by_key(|e| e.start);
        Ok(events)
    }

    async fn create_event(&self, event: NewEvent) -> anyhow::Result<BookingOutcome> {
        if event.start >= event.end {
            return Ok(BookingOutcome::rejected("Start time must be before end time"));
        }

        let body = InsertEvent {
            summary: &event.title,
            description: event.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION),
            start: EventTime::utc(&event.start),
            end: EventTime::utc(&event.end),
            attendees: event
                .attendees
                .iter()
                .map(|email| Attendee {
                    email: Some(email.clone()),
                })
                .collect(),
        };

        let resp = self
            .client
            .post(self.events_url(None)?)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("failed to call Google Calendar API")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Google Calendar response")?;

        if !status.is_success() {
            let reason = data["error"]["message"].as_str().unwrap_or("unknown error");
            tracing::warn!(%status, reason, "Google Calendar rejected event");
            return Ok(BookingOutcome::rejected(format!(
                "Failed to book appointment: {reason}"
            )));
        }

        let id = data["id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing id in Google Calendar response"))?;

        tracing::info!(event_id = %id, backend = "google", "event created");
        Ok(BookingOutcome::booked(
            id,
            format!(
                "Appointment '{}' booked for {}",
                event.title,
                timeparse::format_when(&event.start)
            ),
        ))
    }

    async fn delete_event(&self, id: &str) -> anyhow::Result<bool> {
        let resp = self
            .client
            .delete(self.events_url(Some(id))?)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("failed to call Google Calendar API")?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(false),
            s => anyhow::bail!("Google Calendar delete failed ({s})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_timed_and_all_day_items() {
        let payload = r#"{
            "items": [
                {"id": "a", "summary": "Standup",
                 "start": {"dateTime": "2026-10-20T10:00:00Z"},
                 "end": {"dateTime": "2026-10-20T10:30:00Z"},
                 "attendees": [{"email": "lee@example.com"}]},
                {"id": "b", "summary": "Holiday",
                 "start": {"date": "2026-10-21"},
                 "end": {"date": "2026-10-22"}},
                {"id": "c", "status": "cancelled",
                 "start": {"dateTime": "2026-10-20T12:00:00Z"},
                 "end": {"dateTime": "2026-10-20T13:00:00Z"}}
            ]
        }"#;
        let list: EventList = serde_json::from_str(payload).unwrap();
        let events: Vec<_> = list.items.into_iter().filter_map(GoogleEvent::into_event).collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start, dt("2026-10-20 10:00"));
        assert_eq!(events[0].attendees, vec!["lee@example.com".to_string()]);
        assert!(!events[0].all_day);
        assert!(events[1].all_day);
        assert!(!events[1].conflicts_with(dt("2026-10-21 10:00"), dt("2026-10-21 11:00")));
    }

    #[test]
    fn test_offsets_are_normalised_to_utc() {
        let time = EventTime {
            date_time: Some("2026-10-20T12:00:00+02:00".to_string()),
            ..Default::default()
        };
        assert_eq!(time.resolve(), Some((dt("2026-10-20 10:00"), false)));
    }

    #[test]
    fn test_events_url_layout() {
        let cal = GoogleCalendar::new(
            BusinessHours::default(),
            "team@example.com".to_string(),
            "token".to_string(),
        );
        let url = cal.events_url(Some("abc")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team@example.com/events/abc"
        );
    }

    #[test]
    fn test_insert_body_shape() {
        let body = InsertEvent {
            summary: "Call",
            description: DEFAULT_DESCRIPTION,
            start: EventTime::utc(&dt("2026-10-20 15:00")),
            end: EventTime::utc(&dt("2026-10-20 16:00")),
            attendees: vec![],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["start"]["dateTime"], "2026-10-20T15:00:00");
        assert_eq!(json["start"]["timeZone"], "UTC");
        assert!(json.get("attendees").is_none());
    }
}
