use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::{ConversationMessage, StateSnapshot};
use crate::state::AppState;

#[derive(Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub state: StateSnapshot,
    pub messages: Vec<ConversationMessage>,
}

// GET /sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let (snapshot, messages) = state
        .engine
        .session_view(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("session {id}")))?;

    Ok(Json(SessionView {
        session_id: id,
        state: snapshot,
        messages,
    }))
}

// DELETE /sessions/:id
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !state.engine.reset_session(&id) {
        return Err(AppError::NotFound(format!("session {id}")));
    }
    Ok(Json(json!({ "success": true, "message": format!("Session {id} reset") })))
}
