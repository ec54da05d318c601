use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveDateTime};
use tower::ServiceExt;

use bookwise::config::AppConfig;
use bookwise::db;
use bookwise::handlers;
use bookwise::models::{BusinessHours, DialogueState};
use bookwise::services::ai::{CompletionOptions, LlmProvider, Message};
use bookwise::services::calendar::{CalendarBackend, MemoryCalendar, SqliteCalendar};
use bookwise::services::clock::FixedClock;
use bookwise::services::conversation::DialogueEngine;
use bookwise::services::sessions::MemorySessionStore;
use bookwise::state::AppState;

// ── Mock Providers ──

/// Answers by prompt: classification, extraction, or free-form reply.
struct ScriptedLlm {
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        _options: CompletionOptions,
    ) -> anyhow::Result<String> {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        self.prompts.lock().unwrap().push(last.to_string());

        if system_prompt.contains("Classify the user's message") {
            if last.contains("consult") {
                return Ok(r#"{"intent": "BOOK_APPOINTMENT", "confidence": 0.9}"#.to_string());
            }
            return Ok(r#"{"intent": "UNKNOWN", "confidence": 0.4}"#.to_string());
        }
        if system_prompt.contains("extract appointment details") {
            return Ok(r#"```json
{"start_time": "2026-10-22T16:00:00", "end_time": null, "duration": "45", "title": "Consultation", "description": null}
```"#
                .to_string());
        }
        Ok("It sounds like you might want to book something. Try \"a call tomorrow at 2 PM\".".to_string())
    }
}

/// Every call fails, as if the provider were unreachable.
struct DownLlm;

#[async_trait]
impl LlmProvider for DownLlm {
    fn name(&self) -> &str {
        "down"
    }

    async fn complete(
        &self,
        _system_prompt: &str,
        _messages: &[Message],
        _options: CompletionOptions,
    ) -> anyhow::Result<String> {
        anyhow::bail!("connection refused")
    }
}

// ── Helpers ──

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

// Monday morning.
fn now() -> NaiveDateTime {
    dt("2026-10-19 08:00")
}

fn engine_on(calendar: Arc<dyn CalendarBackend>) -> DialogueEngine {
    DialogueEngine::new(
        Arc::new(MemorySessionStore::new(100, Duration::minutes(30))),
        calendar,
        Arc::new(FixedClock(now())),
    )
}

fn seeded_calendar() -> Arc<dyn CalendarBackend> {
    Arc::new(MemoryCalendar::seeded(BusinessHours::default(), now().date()))
}

fn test_state() -> Arc<AppState> {
    AppState::new(AppConfig::default(), engine_on(seeded_calendar()))
}

fn test_app(state: Arc<AppState>) -> Router {
    handlers::router(state)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn chat(app: &Router, session_id: &str, message: &str) -> serde_json::Value {
    let (status, json) = send(
        app,
        post_json(
            "/chat",
            serde_json::json!({ "message": message, "session_id": session_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "chat failed: {json}");
    json
}

// ── Health ──

#[tokio::test]
async fn test_health_and_banner() {
    let app = test_app(test_state());

    let (status, json) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["calendar_backend"], "memory");
    assert_eq!(json["llm_provider"], "none");

    let (status, json) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "bookwise");
}

// ── Chat Flow Tests ──

#[tokio::test]
async fn test_chat_books_a_free_slot() {
    let app = test_app(test_state());

    let json = chat(&app, "flow-1", "Can you book a call tomorrow at 3pm for 1 hour?").await;
    assert_eq!(json["session_id"], "flow-1");
    assert_eq!(json["state"]["current_state"], "confirming_booking");
    assert_eq!(json["requires_confirmation"], true);
    assert_eq!(
        json["state"]["appointment_request"]["start_date"],
        "2026-10-20T15:00:00"
    );

    let json = chat(&app, "flow-1", "yes please").await;
    assert_eq!(json["state"]["current_state"], "booking_complete");
    let event_id = json["state"]["last_event_id"].as_str().unwrap().to_string();
    assert!(json["message"].as_str().unwrap().contains(&event_id));

    let (status, json) = send(
        &app,
        get("/events?start_date=2026-10-20T00:00:00&end_date=2026-10-21T00:00:00"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["id"].as_str())
        .collect();
    assert!(ids.contains(&event_id.as_str()));
    assert_eq!(json["count"], 3);
}

#[tokio::test]
async fn test_chat_busy_time_suggests_then_books_choice() {
    let app = test_app(test_state());

    let json = chat(&app, "flow-2", "tomorrow at 10am for 1 hour").await;
    assert_eq!(json["state"]["current_state"], "suggesting_slots");
    let slots = json["available_slots"].as_array().unwrap();
    assert_eq!(slots.len(), 5);
    assert_eq!(slots[0]["start_time"], "2026-10-20T11:00:00");
    assert!(json["message"].as_str().unwrap().contains("Option 1"));

    let json = chat(&app, "flow-2", "the third one").await;
    assert_eq!(json["state"]["current_state"], "confirming_booking");
    assert_eq!(
        json["state"]["appointment_request"]["start_date"],
        "2026-10-20T12:00:00"
    );

    let json = chat(&app, "flow-2", "confirm").await;
    assert_eq!(json["state"]["current_state"], "booking_complete");
}

#[tokio::test]
async fn test_chat_generates_session_id() {
    let app = test_app(test_state());

    let (status, json) = send(&app, post_json("/chat", serde_json::json!({ "message": "hello" }))).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = json["session_id"].as_str().unwrap();
    assert!(!session_id.is_empty());
    assert_eq!(json["state"]["current_state"], "initial");

    let (status, _) = send(&app, get(&format!("/sessions/{session_id}"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let app = test_app(test_state());

    let (status, json) = send(
        &app,
        post_json("/chat", serde_json::json!({ "message": "  <>;()  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("empty"));
}

// ── Session Tests ──

#[tokio::test]
async fn test_session_view_and_reset() {
    let app = test_app(test_state());
    chat(&app, "s-view", "hi").await;
    chat(&app, "s-view", "I want to schedule a meeting").await;

    let (status, json) = send(&app, get("/sessions/s-view")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"]["current_state"], "collecting_details");
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");

    let (status, _) = send(&app, delete("/sessions/s-view")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get("/sessions/s-view")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, delete("/sessions/s-view")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Calendar API Tests ──

#[tokio::test]
async fn test_availability_endpoint() {
    let app = test_app(test_state());

    let (status, json) = send(
        &app,
        get("/availability?start_date=2026-10-20T09:00:00&end_date=2026-10-20T18:00:00&duration_minutes=60"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let slots = json["slots"].as_array().unwrap();
    assert_eq!(slots[0]["start_time"], "2026-10-20T09:00:00");
    // 10:00-11:00 and 14:00-15:00 are taken.
    assert!(slots.iter().all(|s| s["start_time"] != "2026-10-20T10:00:00"));
    assert!(slots.iter().all(|s| s["start_time"] != "2026-10-20T14:00:00"));
    assert_eq!(json["count"], slots.len());
    assert_eq!(json["business_hours"], "Mon-Fri, 09:00-18:00");
}

#[tokio::test]
async fn test_availability_validates_window() {
    let app = test_app(test_state());

    let (status, _) = send(
        &app,
        get("/availability?start_date=2026-10-21T09:00:00&end_date=2026-10-20T09:00:00"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        get("/availability?start_date=2026-10-10T09:00:00&end_date=2026-10-11T09:00:00"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &app,
        get("/availability?start_date=2027-03-01T09:00:00&end_date=2027-03-02T09:00:00"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "start");

    let (status, json) = send(
        &app,
        get("/availability?start_date=2026-10-20T09:00:00&end_date=9999-12-31T00:00:00"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("90 days"));

    let (status, _) = send(&app, get("/availability?start_date=soon&end_date=later")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_book_and_delete_event() {
    let app = test_app(test_state());

    let (status, json) = send(
        &app,
        post_json(
            "/book",
            serde_json::json!({
                "title": "Dentist",
                "start_time": "2026-10-21T15:00:00",
                "end_time": "2026-10-21T15:30:00",
                "attendees": ["sam@example.com"]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let event_id = json["event_id"].as_str().unwrap().to_string();

    // Same slot again conflicts.
    let (status, json) = send(
        &app,
        post_json(
            "/book",
            serde_json::json!({
                "title": "Overlap",
                "start_time": "2026-10-21T15:15:00",
                "end_time": "2026-10-21T16:00:00"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let (status, _) = send(&app, delete(&format!("/events/{event_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, delete(&format!("/events/{event_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_book_validates_request() {
    let app = test_app(test_state());

    let (status, json) = send(
        &app,
        post_json(
            "/book",
            serde_json::json!({
                "title": "Quick chat",
                "start_time": "2026-10-21T15:00:00",
                "end_time": "2026-10-21T15:05:00"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "duration");

    let (status, _) = send(
        &app,
        post_json(
            "/book",
            serde_json::json!({
                "title": "Backwards",
                "start_time": "2026-10-21T16:00:00",
                "end_time": "2026-10-21T15:00:00"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Engine Tests ──

#[tokio::test]
async fn test_llm_collaborators_lead_the_dialogue() {
    let prompts = Arc::new(Mutex::new(vec![]));
    let engine = engine_on(seeded_calendar()).with_llm(Arc::new(ScriptedLlm {
        prompts: Arc::clone(&prompts),
    }));

    let turn = engine.process_message("I'd like a consult later this week", "llm-1").await;
    assert_eq!(turn.state.current_state, DialogueState::ConfirmingBooking);
    let draft = turn.state.appointment_request.unwrap();
    assert_eq!(draft.start, Some(dt("2026-10-22 16:00")));
    assert_eq!(draft.duration_minutes, Some(45));
    assert_eq!(draft.title.as_deref(), Some("Consultation"));

    let turn = engine.process_message("asdfgh", "llm-2").await;
    assert_eq!(turn.state.current_state, DialogueState::Initial);
    assert!(turn.message.contains("book something"));
    assert!(!prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_llm_falls_back_to_rules() {
    let engine = engine_on(seeded_calendar()).with_llm(Arc::new(DownLlm));

    let turn = engine.process_message("schedule a meeting friday at 2pm", "down-1").await;
    assert!(turn.error.is_none());
    assert_eq!(turn.state.current_state, DialogueState::ConfirmingBooking);
    let draft = turn.state.appointment_request.unwrap();
    assert_eq!(draft.start, Some(dt("2026-10-23 14:00")));

    let turn = engine.process_message("qwerty", "down-2").await;
    assert_eq!(turn.state.current_state, DialogueState::Initial);
    assert!(!turn.message.is_empty());
}

#[tokio::test]
async fn test_sqlite_backend_persists_chat_booking() {
    let conn = db::init_db(":memory:").unwrap();
    let calendar: Arc<dyn CalendarBackend> = Arc::new(SqliteCalendar::new(
        BusinessHours::default(),
        Arc::new(Mutex::new(conn)),
    ));
    let engine = engine_on(Arc::clone(&calendar));

    engine.process_message("an interview wednesday at 11am for 30 minutes", "sql-1").await;
    let turn = engine.process_message("yes", "sql-1").await;
    assert_eq!(turn.state.current_state, DialogueState::BookingComplete);

    let events = calendar
        .list_events(dt("2026-10-21 00:00"), dt("2026-10-22 00:00"))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "Interview");
    assert_eq!(events[0].end, dt("2026-10-21 11:30"));

    // A second session asking for the same time is steered elsewhere.
    let turn = engine.process_message("wednesday at 11am for 30 minutes", "sql-2").await;
    assert_eq!(turn.state.current_state, DialogueState::SuggestingSlots);
}

#[tokio::test]
async fn test_concurrent_sessions_do_not_interfere() {
    let engine = Arc::new(engine_on(seeded_calendar()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let id = format!("c-{i}");
            engine.process_message("tomorrow at 4pm for 30 minutes", &id).await
        }));
    }
    for handle in handles {
        let turn = handle.await.unwrap();
        assert_eq!(turn.state.current_state, DialogueState::ConfirmingBooking);
    }
    assert_eq!(engine.active_sessions(), 8);
}
