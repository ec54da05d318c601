use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn index() -> Json<Value> {
    Json(json!({
        "name": "bookwise",
        "message": "Appointment booking assistant is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": state.clock().now(),
        "calendar_backend": state.calendar().name(),
        "llm_provider": state.engine.llm_name().unwrap_or("none"),
        "active_sessions": state.engine.active_sessions(),
    }))
}
