use std::sync::{Arc, Mutex};

use chrono::Duration;
use tracing_subscriber::EnvFilter;

use bookwise::config::AppConfig;
use bookwise::db;
use bookwise::handlers;
use bookwise::models::BusinessHours;
use bookwise::services::ai::ollama::OllamaProvider;
use bookwise::services::ai::openai::OpenAiCompatibleProvider;
use bookwise::services::ai::LlmProvider;
use bookwise::services::calendar::{
    CalendarBackend, GoogleCalendar, MemoryCalendar, SqliteCalendar,
};
use bookwise::services::clock::{Clock, SystemClock};
use bookwise::services::conversation::DialogueEngine;
use bookwise::services::sessions::MemorySessionStore;
use bookwise::state::AppState;

fn build_calendar(
    config: &AppConfig,
    hours: BusinessHours,
    clock: &dyn Clock,
) -> anyhow::Result<Arc<dyn CalendarBackend>> {
    let calendar: Arc<dyn CalendarBackend> = match config.calendar_backend.as_str() {
        "sqlite" => {
            let conn = db::init_db(&config.database_url)?;
            tracing::info!("using SQLite calendar (path: {})", config.database_url);
            Arc::new(SqliteCalendar::new(hours, Arc::new(Mutex::new(conn))))
        }
        "google" => {
            anyhow::ensure!(
                !config.google_access_token.is_empty(),
                "GOOGLE_ACCESS_TOKEN must be set when CALENDAR_BACKEND=google"
            );
            tracing::info!("using Google calendar (id: {})", config.google_calendar_id);
            Arc::new(GoogleCalendar::new(
                hours,
                config.google_calendar_id.clone(),
                config.google_access_token.clone(),
            ))
        }
        "memory" => {
            tracing::info!("using in-memory calendar with sample events");
            Arc::new(MemoryCalendar::seeded(hours, clock.now().date()))
        }
        other => anyhow::bail!("unknown CALENDAR_BACKEND: {other}"),
    };
    Ok(calendar)
}

fn build_llm(config: &AppConfig) -> anyhow::Result<Option<Arc<dyn LlmProvider>>> {
    let llm: Arc<dyn LlmProvider> = match config.llm_provider.as_str() {
        "openai" => {
            anyhow::ensure!(!config.openai_api_key.is_empty(), "OPENAI_API_KEY must be set when LLM_PROVIDER=openai");
            tracing::info!("using OpenAI LLM provider (model: {})", config.openai_model);
            Arc::new(OpenAiCompatibleProvider::openai(
                config.openai_api_key.clone(),
                config.openai_model.clone(),
            ))
        }
        "groq" => {
            anyhow::ensure!(!config.groq_api_key.is_empty(), "GROQ_API_KEY must be set when LLM_PROVIDER=groq");
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Arc::new(OpenAiCompatibleProvider::groq(
                config.groq_api_key.clone(),
                config.groq_model.clone(),
            ))
        }
        "ollama" => {
            tracing::info!("using Ollama LLM provider (url: {})", config.ollama_url);
            Arc::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
            ))
        }
        "none" => {
            tracing::info!("no LLM provider configured, using keyword and rule-based parsing");
            return Ok(None);
        }
        other => anyhow::bail!("unknown LLM_PROVIDER: {other}"),
    };
    Ok(Some(llm))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    let hours = config.business_hours()?;
    tracing::info!("business hours: {}", hours.to_human_readable());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let calendar = build_calendar(&config, hours, clock.as_ref())?;
    let sessions = Arc::new(MemorySessionStore::new(
        config.session_capacity,
        Duration::minutes(config.session_ttl_minutes),
    ));

    let mut engine = DialogueEngine::new(sessions, calendar, clock);
    if let Some(llm) = build_llm(&config)? {
        engine = engine.with_llm(llm);
    }

    let state = AppState::new(config.clone(), engine);
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
