use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Greeting,
    Help,
    BookAppointment,
    CheckAvailability,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "GREETING",
            Intent::Help => "HELP",
            Intent::BookAppointment => "BOOK_APPOINTMENT",
            Intent::CheckAvailability => "CHECK_AVAILABILITY",
            Intent::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "GREETING" => Intent::Greeting,
            "HELP" => Intent::Help,
            "BOOK_APPOINTMENT" => Intent::BookAppointment,
            "CHECK_AVAILABILITY" => Intent::CheckAvailability,
            _ => Intent::Unknown,
        }
    }

    /// Intents that start collecting an appointment draft.
    pub fn starts_booking(&self) -> bool {
        matches!(self, Intent::BookAppointment | Intent::CheckAvailability)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f32,
    /// Informational only; nothing downstream depends on specific keys.
    #[serde(default)]
    pub entities: Map<String, Value>,
}

impl IntentResult {
    pub fn new(intent: Intent, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            intent,
            confidence,
            entities: Map::new(),
        }
    }

    pub fn with_entity(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.entities.insert(key.to_string(), value.into());
        self
    }
}

/// Structured hints pulled out of one utterance. Every field is independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedDetails {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub duration_minutes: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl ExtractedDetails {
    pub fn is_empty(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.duration_minutes.is_none()
            && self.title.is_none()
            && self.description.is_none()
    }
}
