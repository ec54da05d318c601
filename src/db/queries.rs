use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::models::CalendarEvent;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Events ──

pub fn insert_event(conn: &Connection, event: &CalendarEvent) -> anyhow::Result<()> {
    let attendees = serde_json::to_string(&event.attendees)?;

    conn.execute(
        "INSERT INTO events (id, title, description, start_time, end_time, location, attendees, all_day)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.id,
            event.title,
            event.description,
            event.start.format(TIME_FORMAT).to_string(),
            event.end.format(TIME_FORMAT).to_string(),
            event.location,
            attendees,
            event.all_day,
        ],
    )?;
    Ok(())
}

/// Events overlapping `[start, end)`, earliest first.
pub fn get_events_in_range(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<Vec<CalendarEvent>> {
    let start_str = start.format(TIME_FORMAT).to_string();
    let end_str = end.format(TIME_FORMAT).to_string();

    let mut stmt = conn.prepare(
        "SELECT id, title, description, start_time, end_time, location, attendees, all_day
         FROM events WHERE start_time < ?2 AND end_time > ?1 ORDER BY start_time ASC",
    )?;

    let rows = stmt.query_map(params![start_str, end_str], |row| Ok(parse_event_row(row)))?;

    let mut events = vec![];
    for row in rows {
        events.push(row??);
    }
    Ok(events)
}

/// True when a timed event overlaps `[start, end)`.
pub fn has_conflict(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE all_day = 0 AND start_time < ?2 AND end_time > ?1",
        params![
            start.format(TIME_FORMAT).to_string(),
            end.format(TIME_FORMAT).to_string()
        ],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn delete_event(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let deleted = conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

fn parse_event_row(row: &rusqlite::Row) -> anyhow::Result<CalendarEvent> {
    let start_str: String = row.get(3)?;
    let end_str: String = row.get(4)?;
    let attendees_json: String = row.get(6)?;

    Ok(CalendarEvent {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        start: NaiveDateTime::parse_from_str(&start_str, TIME_FORMAT)?,
        end: NaiveDateTime::parse_from_str(&end_str, TIME_FORMAT)?,
        location: row.get(5)?,
        attendees: serde_json::from_str(&attendees_json).unwrap_or_default(),
        all_day: row.get(7)?,
    })
}
