use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{AppointmentDraft, IntentResult, TimeSlot};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    Initial,
    CollectingDetails,
    CheckingAvailability,
    SuggestingSlots,
    ConfirmingBooking,
    BookingComplete,
}

impl DialogueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogueState::Initial => "initial",
            DialogueState::CollectingDetails => "collecting_details",
            DialogueState::CheckingAvailability => "checking_availability",
            DialogueState::SuggestingSlots => "suggesting_slots",
            DialogueState::ConfirmingBooking => "confirming_booking",
            DialogueState::BookingComplete => "booking_complete",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: NaiveDateTime,
}

/// Per-conversation state. `messages` is append-only.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub messages: Vec<ConversationMessage>,
    pub state: DialogueState,
    pub draft: Option<AppointmentDraft>,
    pub intent: Option<IntentResult>,
    pub offered_slots: Vec<TimeSlot>,
    pub last_event_id: Option<String>,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
    pub last_activity: NaiveDateTime,
}

impl Session {
    pub fn new(id: &str, now: NaiveDateTime) -> Self {
        Self {
            id: id.to_string(),
            messages: Vec::new(),
            state: DialogueState::Initial,
            draft: None,
            intent: None,
            offered_slots: Vec::new(),
            last_event_id: None,
            error: None,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn push_user(&mut self, content: &str, now: NaiveDateTime) {
        self.push(Role::User, content, now);
    }

    pub fn push_assistant(&mut self, content: impl Into<String>, now: NaiveDateTime) {
        self.push(Role::Assistant, content, now);
    }

    fn push(&mut self, role: Role, content: impl Into<String>, now: NaiveDateTime) {
        self.messages.push(ConversationMessage {
            role,
            content: content.into(),
            timestamp: now,
        });
        self.last_activity = now;
    }

    /// The newest assistant reply appended at or after `from` (a message index).
    pub fn reply_since(&self, from: usize) -> Option<&str> {
        self.messages
            .get(from..)?
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Drop the in-progress request once it is booked or abandoned.
    pub fn clear_booking(&mut self) {
        self.draft = None;
        self.offered_slots.clear();
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            current_state: self.state,
            appointment_request: self.draft.clone(),
            available_slots: self.offered_slots.clone(),
            last_event_id: self.last_event_id.clone(),
            error_message: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub current_state: DialogueState,
    pub appointment_request: Option<AppointmentDraft>,
    pub available_slots: Vec<TimeSlot>,
    pub last_event_id: Option<String>,
    pub error_message: Option<String>,
}

impl StateSnapshot {
    /// What a brand-new session looks like, used when a turn has to be abandoned.
    pub fn reset() -> Self {
        Self {
            current_state: DialogueState::Initial,
            appointment_request: None,
            available_slots: Vec::new(),
            last_event_id: None,
            error_message: None,
        }
    }
}

/// Result of one turn, handed to the transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub message: String,
    pub state: StateSnapshot,
    pub available_slots: Vec<TimeSlot>,
    pub requires_confirmation: bool,
    pub error: Option<String>,
}

impl TurnResponse {
    pub fn from_session(session: &Session, message: String) -> Self {
        let state = session.snapshot();
        Self {
            message,
            available_slots: state.available_slots.clone(),
            requires_confirmation: session.state == DialogueState::ConfirmingBooking,
            error: session.error.clone(),
            state,
        }
    }

    pub fn failure(message: String, error: String) -> Self {
        Self {
            message,
            state: StateSnapshot::reset(),
            available_slots: Vec::new(),
            requires_confirmation: false,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2026-10-19 08:00", "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_state_names_match_wire_format() {
        for state in [
            DialogueState::Initial,
            DialogueState::CollectingDetails,
            DialogueState::CheckingAvailability,
            DialogueState::SuggestingSlots,
            DialogueState::ConfirmingBooking,
            DialogueState::BookingComplete,
        ] {
            let wire = serde_json::to_string(&state).unwrap();
            assert_eq!(wire, format!("\"{}\"", state.as_str()));
            assert_eq!(serde_json::from_str::<DialogueState>(&wire).unwrap(), state);
        }
        assert!(serde_json::from_str::<DialogueState>("\"bogus\"").is_err());
    }

    #[test]
    fn test_reply_since_ignores_older_turns() {
        let mut session = Session::new("s1", now());
        session.push_user("hi", now());
        session.push_assistant("Hello!", now());
        let mark = session.messages.len();
        session.push_user("book", now());

        assert_eq!(session.reply_since(0), Some("Hello!"));
        assert_eq!(session.reply_since(mark), None);

        session.push_assistant("When?", now());
        assert_eq!(session.reply_since(mark), Some("When?"));
    }

    #[test]
    fn test_requires_confirmation_tracks_state() {
        let mut session = Session::new("s1", now());
        session.state = DialogueState::ConfirmingBooking;
        let response = TurnResponse::from_session(&session, "Book it?".to_string());
        assert!(response.requires_confirmation);

        session.state = DialogueState::SuggestingSlots;
        let response = TurnResponse::from_session(&session, "Pick one".to_string());
        assert!(!response.requires_confirmation);
    }
}
