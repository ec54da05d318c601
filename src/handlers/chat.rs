use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::TurnResponse;
use crate::state::AppState;

const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub turn: TurnResponse,
}

/// Strips markup and shell-ish punctuation, trims, and caps the length.
pub fn sanitize_input(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '&' | ';' | '(' | ')' | '{' | '}'))
        .collect();
    stripped.trim().chars().take(MAX_MESSAGE_CHARS).collect()
}

// POST /chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = sanitize_input(&payload.message);
    if message.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }

    let session_id = payload
        .session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::info!(
        session_id = %session_id,
        user_id = payload.user_id.as_deref().unwrap_or("anonymous"),
        chars = message.chars().count(),
        "chat message received"
    );

    let turn = state.engine.process_message(&message, &session_id).await;
    Ok(Json(ChatResponse { session_id, turn }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_and_trims() {
        assert_eq!(sanitize_input("  <b>Book</b> (tomorrow); ok  "), "bBook/b tomorrow ok");
        assert_eq!(sanitize_input("it's \"fine\" & {done}"), "its fine  done");
        assert_eq!(sanitize_input(" <>;; "), "");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "a".repeat(1500);
        assert_eq!(sanitize_input(&long).len(), 1000);
    }
}
