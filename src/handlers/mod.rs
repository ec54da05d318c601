pub mod calendar;
pub mod chat;
pub mod health;
pub mod sessions;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health))
        .route("/chat", post(chat::chat))
        .route(
            "/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/availability", get(calendar::availability))
        .route("/book", post(calendar::book))
        .route("/events", get(calendar::list_events))
        .route("/events/:id", delete(calendar::delete_event))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
