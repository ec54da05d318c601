use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::AppError;
use crate::models::draft::DEFAULT_DURATION_MINUTES;
use crate::models::{CalendarEvent, NewEvent, TimeSlot};
use crate::services::scheduling::{validate_duration, validate_interval, validate_window};
use crate::services::timeparse;
use crate::state::AppState;

const DEFAULT_EVENTS_WINDOW_DAYS: i64 = 7;

fn parse_param(name: &str, value: &str) -> Result<NaiveDateTime, AppError> {
    timeparse::parse_local_datetime(value)
        .ok_or_else(|| AppError::BadRequest(format!("invalid {name}: {value}")))
}

// GET /availability
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub slots: Vec<TimeSlot>,
    pub count: usize,
    pub duration_minutes: i64,
    pub business_hours: String,
}

pub async fn availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let start = parse_param("start_date", &query.start_date)?;
    let end = parse_param("end_date", &query.end_date)?;
    let duration = query.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);

    let now = state.clock().now();
    validate_window(start, end, now, state.limits())?;
    validate_duration(duration, state.limits())?;

    // Nothing before now is offered.
    let slots = state
        .calendar()
        .free_slots(start.max(now), end, duration)
        .await?;

    Ok(Json(AvailabilityResponse {
        count: slots.len(),
        slots,
        duration_minutes: duration,
        business_hours: state.calendar().business_hours().to_human_readable(),
    }))
}

// POST /book
#[derive(Deserialize)]
pub struct BookRequest {
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

pub async fn book(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BookRequest>,
) -> Result<Response, AppError> {
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::BadRequest("title must not be empty".to_string()));
    }
    let start = parse_param("start_time", &payload.start_time)?;
    let end = parse_param("end_time", &payload.end_time)?;
    validate_interval(start, end, state.clock().now(), state.limits())?;

    let outcome = state
        .calendar()
        .create_event(NewEvent {
            title,
            start,
            end,
            description: payload.description,
            attendees: payload.attendees,
        })
        .await?;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        tracing::info!(reason = %outcome.message, "direct booking rejected");
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(outcome)).into_response())
}

// GET /events
#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<CalendarEvent>,
    pub count: usize,
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, AppError> {
    let start = match query.start_date.as_deref() {
        Some(value) => parse_param("start_date", value)?,
        None => state.clock().now(),
    };
    let end = match query.end_date.as_deref() {
        Some(value) => parse_param("end_date", value)?,
        None => start + Duration::days(DEFAULT_EVENTS_WINDOW_DAYS),
    };
    if start >= end {
        return Err(AppError::BadRequest(
            "start_date must be before end_date".to_string(),
        ));
    }

    let events = state.calendar().list_events(start, end).await?;
    Ok(Json(EventsResponse {
        count: events.len(),
        events,
    }))
}

// DELETE /events/:id
pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.calendar().delete_event(&id).await? {
        return Err(AppError::NotFound(format!("event {id}")));
    }
    tracing::info!(event_id = %id, "event deleted");
    Ok(Json(json!({ "success": true, "message": format!("Event {id} deleted") })))
}
