use std::env;

use crate::models::BusinessHours;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub calendar_backend: String,
    pub database_url: String,
    pub google_calendar_id: String,
    pub google_access_token: String,
    pub llm_provider: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub business_open: String,
    pub business_close: String,
    pub business_days: String,
    pub session_capacity: usize,
    pub session_ttl_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT", 8001),
            calendar_backend: var_or("CALENDAR_BACKEND", "memory").to_lowercase(),
            database_url: var_or("DATABASE_URL", "bookwise.db"),
            google_calendar_id: var_or("GOOGLE_CALENDAR_ID", "primary"),
            google_access_token: env::var("GOOGLE_ACCESS_TOKEN").unwrap_or_default(),
            llm_provider: var_or("LLM_PROVIDER", "none").to_lowercase(),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: var_or("OPENAI_MODEL", "gpt-4o-mini"),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: var_or("GROQ_MODEL", "llama-3.1-8b-instant"),
            ollama_url: var_or("OLLAMA_URL", "http://localhost:11434"),
            ollama_model: var_or("OLLAMA_MODEL", "llama3.2"),
            business_open: var_or("BUSINESS_OPEN", "09:00"),
            business_close: var_or("BUSINESS_CLOSE", "18:00"),
            business_days: var_or("BUSINESS_DAYS", "mon,tue,wed,thu,fri"),
            session_capacity: parsed("SESSION_CAPACITY", 1000),
            session_ttl_minutes: parsed("SESSION_TTL_MINUTES", 30),
        }
    }

    /// Fails on malformed hour strings so a bad deployment stops at startup.
    pub fn business_hours(&self) -> anyhow::Result<BusinessHours> {
        BusinessHours::parse(&self.business_days, &self.business_open, &self.business_close)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8001,
            calendar_backend: "memory".to_string(),
            database_url: "bookwise.db".to_string(),
            google_calendar_id: "primary".to_string(),
            google_access_token: String::new(),
            llm_provider: "none".to_string(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o-mini".to_string(),
            groq_api_key: String::new(),
            groq_model: "llama-3.1-8b-instant".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            business_open: "09:00".to_string(),
            business_close: "18:00".to_string(),
            business_days: "mon,tue,wed,thu,fri".to_string(),
            session_capacity: 1000,
            session_ttl_minutes: 30,
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
