use std::sync::{Arc, OnceLock};

use anyhow::Context;
use chrono::{Duration, NaiveDateTime};
use regex::Regex;

use crate::models::draft::DEFAULT_DURATION_MINUTES;
use crate::models::{
    AppointmentDraft, ConversationMessage, DialogueState, Intent, IntentResult, NewEvent, Role,
    Session, StateSnapshot, TimeSlot, TurnResponse,
};
use crate::services::ai::classifier::{
    has_any, words, ClassifierChain, IntentClassifier, LlmClassifier,
};
use crate::services::ai::extractor::{
    DetailExtractor, ExtractionContext, ExtractorChain, LlmExtractor,
};
use crate::services::ai::{CompletionOptions, LlmProvider, Message};
use crate::services::availability::MAX_SUGGESTIONS;
use crate::services::calendar::CalendarBackend;
use crate::services::clock::Clock;
use crate::services::scheduling::{validate_draft, BookingLimits, ValidationError};
use crate::services::sessions::SessionStore;
use crate::services::timeparse::{self, format_when};

const SUGGESTION_WINDOW_DAYS: i64 = 7;
const CONTEXT_MESSAGES: usize = 5;

const AFFIRMATIVE: &[&str] = &["yes", "confirm", "book", "schedule", "ok", "okay", "sure"];
// Checked before AFFIRMATIVE, so "don't book it" cancels. "don't" splits into "don t".
const NEGATIVE: &[&str] = &[
    "no", "cancel", "nevermind", "never mind", "not now", "don t", "dont", "do not",
];
const ORDINALS: &[&str] = &["first", "second", "third", "fourth", "fifth"];

const GREETING_REPLY: &str = "Hello! I'm your appointment booking assistant. I can help you:

• Schedule appointments and meetings
• Check your calendar availability
• Find the best time slots for you

What would you like to do today? You can say things like:
\"I want to schedule a call for tomorrow afternoon\"
\"Do you have any free time this Friday?\"
\"Book a meeting between 3-5 PM next week\"";

const ASK_FOR_TIME: &str = "I'd be happy to help you schedule an appointment! I just need to know when you'd like to meet. You can say things like:

• \"Tomorrow at 3 PM for 1 hour\"
• \"Next Monday between 2-4 PM\"
• \"A 30-minute call this afternoon\"

When would you like to schedule your appointment?";

const UNKNOWN_REPLY: &str = "I'm not sure I understood that. I can book appointments and check availability. Try something like \"Schedule a meeting tomorrow at 2 PM\" or \"What's free on Friday?\"";

const CONTEXT_PROMPT: &str = "You are an appointment booking assistant. The user said something unclear. \
Reply helpfully: guess what they might want, steer them toward booking an appointment, \
give a concrete example request, stay friendly, and answer in two or three sentences.";

fn re_selector() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\b(?:option|slot|number)\s*#?\s*|#\s*)(\d{1,2})\b").unwrap())
}

fn re_bare_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*#?(\d{1,2})\s*[.!)]?\s*$").unwrap())
}

/// Turn-by-turn controller for booking conversations.
///
/// Every collaborator is injected: where sessions live, which calendar is
/// booked against, how intents and details are read, and what "now" is.
pub struct DialogueEngine {
    sessions: Arc<dyn SessionStore>,
    calendar: Arc<dyn CalendarBackend>,
    clock: Arc<dyn Clock>,
    classifier: ClassifierChain,
    extractor: ExtractorChain,
    llm: Option<Arc<dyn LlmProvider>>,
    limits: BookingLimits,
}

impl DialogueEngine {
    /// An engine using keyword classification and rule-based extraction only.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        calendar: Arc<dyn CalendarBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            calendar,
            clock,
            classifier: ClassifierChain::keyword_only(),
            extractor: ExtractorChain::rules_only(),
            llm: None,
            limits: BookingLimits::default(),
        }
    }

    /// Put a language model in front of the deterministic collaborators and use
    /// it for free-form replies.
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.classifier.prepend(Arc::new(LlmClassifier::new(llm.clone())));
        self.extractor.prepend(Arc::new(LlmExtractor::new(llm.clone())));
        self.llm = Some(llm);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier.prepend(classifier);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn DetailExtractor>) -> Self {
        self.extractor.prepend(extractor);
        self
    }

    pub fn with_limits(mut self, limits: BookingLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn calendar(&self) -> &Arc<dyn CalendarBackend> {
        &self.calendar
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn limits(&self) -> &BookingLimits {
        &self.limits
    }

    pub fn llm_name(&self) -> Option<&str> {
        self.llm.as_ref().map(|llm| llm.name())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Run one user turn. Never fails: internal errors reset the session and
    /// come back as a response carrying `error`.
    pub async fn process_message(&self, text: &str, session_id: &str) -> TurnResponse {
        let now = self.clock.now();
        let handle = self.sessions.checkout(session_id, now);
        let mut session = handle.lock().await;

        let mark = session.messages.len();
        session.push_user(text, now);
        session.error = None;
        session.intent = None;

        tracing::info!(session_id, state = session.state.as_str(), "processing message");

        match self.route(&mut session, text, now).await {
            Ok(()) => {
                let reply = session.reply_since(mark).unwrap_or_default().to_string();
                tracing::info!(
                    session_id,
                    state = session.state.as_str(),
                    offered = session.offered_slots.len(),
                    "turn complete"
                );
                TurnResponse::from_session(&session, reply)
            }
            Err(e) => {
                tracing::error!(session_id, error = %e, "turn failed, resetting session");
                let reply = format!("I encountered an error: {e}. Let me help you start over.");
                session.push_assistant(reply.clone(), now);
                session.clear_booking();
                session.state = DialogueState::Initial;
                session.error = Some(e.to_string());
                TurnResponse::failure(reply, e.to_string())
            }
        }
    }

    /// Current state and transcript of a live session.
    pub async fn session_view(
        &self,
        session_id: &str,
    ) -> Option<(StateSnapshot, Vec<ConversationMessage>)> {
        let handle = self.sessions.get(session_id, self.clock.now())?;
        let session = handle.lock().await;
        Some((session.snapshot(), session.messages.clone()))
    }

    pub fn reset_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id);
        if removed {
            tracing::info!(session_id, "session reset");
        }
        removed
    }

    async fn route(&self, session: &mut Session, text: &str, now: NaiveDateTime) -> anyhow::Result<()> {
        match session.state {
            DialogueState::Initial | DialogueState::BookingComplete => {
                self.handle_initial(session, text, now).await
            }
            DialogueState::CollectingDetails | DialogueState::CheckingAvailability => {
                self.collect_details(session, text, now).await
            }
            DialogueState::SuggestingSlots => self.handle_slot_reply(session, text, now).await,
            DialogueState::ConfirmingBooking => self.handle_confirmation(session, text, now).await,
        }
    }

    async fn handle_initial(
        &self,
        session: &mut Session,
        text: &str,
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        let result = self
            .classifier
            .classify(text)
            .await
            .unwrap_or_else(|| IntentResult::new(Intent::Unknown, 0.0));

        tracing::info!(
            session_id = %session.id,
            intent = result.intent.as_str(),
            confidence = result.confidence,
            "intent classified"
        );
        let intent = result.intent;
        session.intent = Some(result);

        match intent {
            Intent::Greeting => {
                session.push_assistant(GREETING_REPLY, now);
                transition(session, DialogueState::Initial);
                Ok(())
            }
            Intent::Help => {
                let reply = self.help_reply();
                session.push_assistant(reply, now);
                transition(session, DialogueState::Initial);
                Ok(())
            }
            _ if intent.starts_booking() => {
                session.clear_booking();
                session.draft = Some(AppointmentDraft::default());
                transition(session, DialogueState::CollectingDetails);
                self.collect_details(session, text, now).await
            }
            _ => self.contextual_reply(session, text, now).await,
        }
    }

    async fn collect_details(
        &self,
        session: &mut Session,
        text: &str,
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        let context = ExtractionContext {
            now,
            draft: session.draft.clone(),
        };
        let extracted = self.extractor.extract(text, &context).await;
        let fallback = timeparse::extract_hints(text, now);

        let draft = session.draft.get_or_insert_with(AppointmentDraft::default);
        draft.merge(extracted.as_ref(), &fallback);

        if !draft.has_start() {
            session.push_assistant(ASK_FOR_TIME, now);
            transition(session, DialogueState::CollectingDetails);
            return Ok(());
        }

        if !draft.is_complete() {
            let reply = format!(
                "Great! I see you want to meet on {}. How long should the meeting be? (e.g., '30 minutes', '1 hour')",
                draft.start.map(|s| format_when(&s)).unwrap_or_default()
            );
            session.push_assistant(reply, now);
            transition(session, DialogueState::CollectingDetails);
            return Ok(());
        }

        match validate_draft(draft, self.calendar.business_hours(), now, &self.limits) {
            Ok(()) => {
                transition(session, DialogueState::CheckingAvailability);
                self.check_availability(session, now).await
            }
            Err(ValidationError::OutsideBusinessHours { hours }) => {
                let preface = format!(
                    "{} is outside business hours ({hours}).",
                    draft.start.map(|s| format_when(&s)).unwrap_or_default()
                );
                transition(session, DialogueState::SuggestingSlots);
                self.suggest_slots(session, now, Some(preface)).await
            }
            Err(e) => {
                tracing::info!(session_id = %session.id, field = e.field(), error = %e, "draft rejected");
                let reply = rejection_reply(draft, &e);
                session.push_assistant(reply, now);
                transition(session, DialogueState::CollectingDetails);
                Ok(())
            }
        }
    }

    async fn check_availability(&self, session: &mut Session, now: NaiveDateTime) -> anyhow::Result<()> {
        let draft = session
            .draft
            .as_ref()
            .context("no appointment details to check")?;
        let (start, end) = draft
            .interval()
            .context("appointment has no start time to check")?;

        match self.calendar.is_free(start, end).await {
            Ok(true) => {
                let reply = format!(
                    "Perfect! {} is available for your {}.\n\n{}\n\nWould you like me to book this appointment? (Yes/No)",
                    format_when(&start),
                    draft.title_or_default().to_lowercase(),
                    summary(draft)
                );
                session.push_assistant(reply, now);
                transition(session, DialogueState::ConfirmingBooking);
                Ok(())
            }
            Ok(false) => {
                let preface = format!("I'm sorry, but {} is not available.", format_when(&start));
                transition(session, DialogueState::SuggestingSlots);
                self.suggest_slots(session, now, Some(preface)).await
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    backend = self.calendar.name(),
                    error = %e,
                    "availability check failed"
                );
                let preface =
                    "I couldn't check your calendar just now, so let me find some open times instead.".to_string();
                transition(session, DialogueState::SuggestingSlots);
                self.suggest_slots(session, now, Some(preface)).await
            }
        }
    }

    async fn suggest_slots(
        &self,
        session: &mut Session,
        now: NaiveDateTime,
        preface: Option<String>,
    ) -> anyhow::Result<()> {
        let draft = session
            .draft
            .as_ref()
            .context("no appointment details to suggest times for")?;
        let duration = draft.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        let title = draft.title_or_default().to_lowercase();
        let window_start = draft.start.map_or(now, |start| start.max(now));
        let window_end = window_start + Duration::days(SUGGESTION_WINDOW_DAYS);

        let preface = preface.map(|p| format!("{p} ")).unwrap_or_default();

        let found = self
            .calendar
            .free_slots(window_start, window_end, duration)
            .await;

        match found {
            Ok(slots) if !slots.is_empty() => {
                let offered: Vec<TimeSlot> = slots.into_iter().take(MAX_SUGGESTIONS).collect();
                let options = offered
                    .iter()
                    .enumerate()
                    .map(|(i, slot)| format!("• Option {}: {}", i + 1, format_when(&slot.start())))
                    .collect::<Vec<_>>()
                    .join("\n");
                let reply = format!(
                    "{preface}Here are some alternative times for your {duration}-minute {title}:\n\n{options}\n\nWhich option works best for you? You can say \"Option 1\", \"Option 2\", etc., or suggest a different time."
                );

                session.offered_slots = offered;
                session.push_assistant(reply, now);
                transition(session, DialogueState::SuggestingSlots);
            }
            Ok(_) => {
                let reply = format!(
                    "{preface}I couldn't find any available slots for a {duration}-minute {title} in the next week. Could you suggest some other times or dates that might work for you?"
                );
                release_time(session);
                session.push_assistant(reply, now);
                transition(session, DialogueState::CollectingDetails);
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    backend = self.calendar.name(),
                    error = %e,
                    "slot search failed"
                );
                let reply = format!(
                    "{preface}I couldn't look up alternative times right now. Could you suggest a time that might work for you?"
                );
                release_time(session);
                session.push_assistant(reply, now);
                transition(session, DialogueState::CollectingDetails);
            }
        }
        Ok(())
    }

    async fn handle_slot_reply(
        &self,
        session: &mut Session,
        text: &str,
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        let Some(index) = select_offered(text, session.offered_slots.len()) else {
            // Not a selection: read it as new details for the same request.
            release_time(session);
            transition(session, DialogueState::CollectingDetails);
            return self.collect_details(session, text, now).await;
        };

        let slot = session.offered_slots[index];
        session.offered_slots.clear();
        let draft = session.draft.get_or_insert_with(AppointmentDraft::default);
        draft.adopt_slot(&slot);

        let reply = format!(
            "Great choice! I'll book your {} for:\n\n{}\n\nWould you like me to confirm this booking? (Yes/No)",
            draft.title_or_default().to_lowercase(),
            summary(draft)
        );
        tracing::info!(session_id = %session.id, option = index + 1, "offered slot selected");
        session.push_assistant(reply, now);
        transition(session, DialogueState::ConfirmingBooking);
        Ok(())
    }

    async fn handle_confirmation(
        &self,
        session: &mut Session,
        text: &str,
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        let lowered = text.to_lowercase();
        let words = words(&lowered);

        if has_any(&words, NEGATIVE) {
            session.clear_booking();
            session.push_assistant(
                "No problem! Your appointment has not been booked. Is there anything else I can help you with? You can always start over by telling me when you'd like to schedule something.",
                now,
            );
            transition(session, DialogueState::Initial);
            return Ok(());
        }

        if has_any(&words, AFFIRMATIVE) {
            return self.commit_booking(session, now).await;
        }

        session.push_assistant(
            "I didn't understand. Would you like me to book this appointment? Please say 'Yes' to confirm or 'No' to cancel.",
            now,
        );
        transition(session, DialogueState::ConfirmingBooking);
        Ok(())
    }

    async fn commit_booking(&self, session: &mut Session, now: NaiveDateTime) -> anyhow::Result<()> {
        let draft = session
            .draft
            .clone()
            .context("no appointment is waiting for confirmation")?;

        if let Err(e) = validate_draft(&draft, self.calendar.business_hours(), now, &self.limits) {
            tracing::info!(session_id = %session.id, field = e.field(), error = %e, "booking blocked by validation");
            let reply = match session.draft.as_mut() {
                Some(current) => rejection_reply(current, &e),
                None => e.to_string(),
            };
            session.push_assistant(reply, now);
            transition(session, DialogueState::CollectingDetails);
            return Ok(());
        }

        let (start, end) = draft
            .interval()
            .context("appointment has no start time to book")?;
        let event = NewEvent {
            title: draft.title_or_default(),
            start,
            end,
            description: draft.description.clone(),
            attendees: draft.attendees.clone(),
        };

        match self.calendar.create_event(event).await {
            Ok(outcome) => match (outcome.success, outcome.event_id) {
                (true, Some(event_id)) => {
                    let reply = format!(
                        "Appointment booked successfully!\n\n{}\n• Event ID: {event_id}\n\nIs there anything else I can help you with?",
                        summary(&draft)
                    );
                    tracing::info!(
                        session_id = %session.id,
                        event_id = %event_id,
                        backend = self.calendar.name(),
                        "appointment booked"
                    );
                    session.last_event_id = Some(event_id);
                    session.clear_booking();
                    session.push_assistant(reply, now);
                    transition(session, DialogueState::BookingComplete);
                }
                _ => {
                    tracing::info!(session_id = %session.id, reason = %outcome.message, "booking rejected by calendar");
                    let reply = format!(
                        "I'm sorry, there was an error booking your appointment: {}. Would you like to try a different time?",
                        outcome.message
                    );
                    release_time(session);
                    session.push_assistant(reply, now);
                    transition(session, DialogueState::CollectingDetails);
                }
            },
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    backend = self.calendar.name(),
                    error = %e,
                    "booking failed"
                );
                release_time(session);
                session.push_assistant(
                    "I encountered an error while booking your appointment. Would you like to try again or choose a different time?",
                    now,
                );
                transition(session, DialogueState::CollectingDetails);
            }
        }
        Ok(())
    }

    async fn contextual_reply(
        &self,
        session: &mut Session,
        text: &str,
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        if let Some(llm) = &self.llm {
            let history: Vec<Message> = session
                .messages
                .iter()
                .rev()
                .skip(1)
                .take(CONTEXT_MESSAGES)
                .rev()
                .map(|m| Message {
                    role: match m.role {
                        Role::User => "user".to_string(),
                        Role::Assistant => "assistant".to_string(),
                    },
                    content: m.content.clone(),
                })
                .chain(std::iter::once(Message::user(text)))
                .collect();

            let options = CompletionOptions {
                temperature: 0.7,
                max_tokens: 150,
            };
            match llm.complete(CONTEXT_PROMPT, &history, options).await {
                Ok(reply) if !reply.trim().is_empty() => {
                    session.push_assistant(reply.trim(), now);
                    transition(session, DialogueState::Initial);
                    return Ok(());
                }
                Ok(_) => tracing::warn!(provider = llm.name(), "empty contextual reply"),
                Err(e) => tracing::warn!(provider = llm.name(), error = %e, "contextual reply failed"),
            }
        }

        session.push_assistant(UNKNOWN_REPLY, now);
        transition(session, DialogueState::Initial);
        Ok(())
    }

    fn help_reply(&self) -> String {
        format!(
            "I'm here to help you book appointments! Here's what I can do:

• Book appointments: meetings, calls, or any other appointment
• Check availability: I can show you open time slots
• Understand natural language like \"tomorrow at 3 PM\"

Examples of what you can say:
• \"Schedule a team meeting for next Monday at 2 PM\"
• \"I need a 30-minute call tomorrow afternoon\"
• \"What's available this Friday?\"
• \"Book a meeting between 10 AM and 12 PM next week\"

Business hours: {}

What would you like to do?",
            self.calendar.business_hours().to_human_readable()
        )
    }
}

fn transition(session: &mut Session, next: DialogueState) {
    if session.state != next {
        tracing::debug!(
            session_id = %session.id,
            from = session.state.as_str(),
            to = next.as_str(),
            "state transition"
        );
        session.state = next;
    }
}

fn release_time(session: &mut Session) {
    session.offered_slots.clear();
    if let Some(draft) = session.draft.as_mut() {
        draft.release_time();
    }
}

/// Message for a rejected draft; forgets the offending field so the next
/// reply can supply it again.
fn rejection_reply(draft: &mut AppointmentDraft, error: &ValidationError) -> String {
    match error.field() {
        "duration" => {
            draft.release_duration();
            format!("{error} How long should the appointment be?")
        }
        _ => {
            draft.release_time();
            format!("{error} When would you like to meet instead?")
        }
    }
}

fn summary(draft: &AppointmentDraft) -> String {
    let when = draft
        .start
        .map(|s| format_when(&s))
        .unwrap_or_else(|| "to be decided".to_string());
    format!(
        "Appointment Details:\n• Date & Time: {when}\n• Duration: {} minutes\n• Title: {}",
        draft.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
        draft.title_or_default()
    )
}

/// Zero-based index of the offered slot a reply picks, if any.
///
/// Accepts "option 2", "slot 2", "number 2", "#2", ordinal words, or a reply that
/// is nothing but the number. Digits inside other text ("I need 2 hours") never select.
pub fn select_offered(text: &str, offered: usize) -> Option<usize> {
    let lowered = text.to_lowercase();
    let mut picks: Vec<usize> = re_selector()
        .captures_iter(&lowered)
        .chain(re_bare_number().captures_iter(&lowered))
        .filter_map(|caps| caps[1].parse().ok())
        .collect();

    let words = words(&lowered);
    picks.extend(
        ORDINALS
            .iter()
            .enumerate()
            .filter(|(_, ordinal)| words.contains(ordinal))
            .map(|(i, _)| i + 1),
    );

    picks
        .into_iter()
        .filter(|n| (1..=offered).contains(n))
        .min()
        .map(|n| n - 1)
}
