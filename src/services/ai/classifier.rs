use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{parse_json_reply, CompletionOptions, LlmProvider, Message};
use crate::models::{Intent, IntentResult};

/// Maps one utterance to an intent. `None` means "no opinion", letting the
/// next classifier in a chain answer.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(&self, text: &str) -> Option<IntentResult>;
}

const CLASSIFIER_PROMPT: &str = r#"You classify messages sent to an appointment booking assistant.

Classify the user's message into exactly one intent:
- GREETING: greetings such as hello or hi
- HELP: asking for help or what the assistant can do
- BOOK_APPOINTMENT: wanting to schedule, book or create an appointment, including bare time expressions
- CHECK_AVAILABILITY: asking about free time, availability or open slots
- UNKNOWN: anything else

Return ONLY a JSON object (no markdown, no explanation):
{"intent": "INTENT_NAME", "confidence": 0.0-1.0, "entities": {"has_time": true/false, "has_duration": true/false, "appointment_type": "meeting/call/... or null"}}

Examples:
- "Tomorrow at 3 PM for 1 hour" -> {"intent": "BOOK_APPOINTMENT", "confidence": 0.95, "entities": {"has_time": true, "has_duration": true, "appointment_type": "meeting"}}
- "Book a meeting between 3-5 PM next week" -> {"intent": "BOOK_APPOINTMENT", "confidence": 0.95, "entities": {"has_time": true, "has_duration": false, "appointment_type": "meeting"}}
"#;

#[derive(Debug, Deserialize)]
struct ClassifierReply {
    intent: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    entities: Map<String, Value>,
}

pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn classify(&self, text: &str) -> Option<IntentResult> {
        let options = CompletionOptions {
            temperature: 0.0,
            max_tokens: 150,
        };
        let response = match self
            .llm
            .complete(CLASSIFIER_PROMPT, &[Message::user(text)], options)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(provider = self.llm.name(), error = %e, "intent classification failed");
                return None;
            }
        };

        let Some(reply) = parse_json_reply::<ClassifierReply>(&response) else {
            tracing::warn!(provider = self.llm.name(), "failed to parse classifier reply as JSON");
            return None;
        };

        let mut result = IntentResult::new(Intent::parse(&reply.intent), reply.confidence.unwrap_or(0.5));
        result.entities = reply.entities;
        Some(result)
    }
}

const HELP_PHRASES: &[&str] = &["help", "what can you do", "how does this work", "what do you do"];
const GREETING_PHRASES: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];
const TIME_CUES: &[&str] = &[
    "today",
    "tomorrow",
    "tonight",
    "next week",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
    "pm",
    "hour",
    "hours",
    "minute",
    "minutes",
    "morning",
    "afternoon",
    "evening",
    "noon",
    "between",
];
const BOOKING_PHRASES: &[&str] = &[
    "book",
    "schedule",
    "appointment",
    "meeting",
    "call",
    "reserve",
    "set up",
    "meet",
];
const AVAILABILITY_PHRASES: &[&str] = &[
    "available",
    "free",
    "open",
    "availability",
    "slots",
    "free time",
];

fn re_clock() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b\d{1,2}(:\d{2})?\s*(am|pm|a\.m\.|p\.m\.)|\b\d{1,2}:\d{2}\b|\b\d{1,2}\s*-\s*\d{1,2}\b")
            .unwrap()
    })
}

/// Deterministic keyword classifier. Always answers.
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn classify_text(&self, text: &str) -> IntentResult {
        let lowered = text.to_lowercase();
        let words = words(&lowered);

        // "good morning" is a greeting, not a time of day.
        let without_greetings = strip_greetings(&words);

        if has_any(&without_greetings, TIME_CUES) || re_clock().is_match(&lowered) {
            return IntentResult::new(Intent::BookAppointment, 0.8).with_entity("has_time", true);
        }
        if has_any(&words, BOOKING_PHRASES) {
            return IntentResult::new(Intent::BookAppointment, 0.7);
        }
        if has_any(&words, AVAILABILITY_PHRASES) {
            return IntentResult::new(Intent::CheckAvailability, 0.7);
        }
        if has_any(&words, HELP_PHRASES) {
            return IntentResult::new(Intent::Help, 0.8);
        }
        if has_any(&words, GREETING_PHRASES) {
            return IntentResult::new(Intent::Greeting, 0.8);
        }
        IntentResult::new(Intent::Unknown, 0.3)
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn classify(&self, text: &str) -> Option<IntentResult> {
        Some(self.classify_text(text))
    }
}

pub(crate) fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whole-word phrase match: every word of `phrase` appears consecutively.
pub(crate) fn has_phrase(words: &[&str], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    !needle.is_empty() && words.windows(needle.len()).any(|w| w == needle.as_slice())
}

pub(crate) fn has_any(words: &[&str], phrases: &[&str]) -> bool {
    phrases.iter().any(|p| has_phrase(words, p))
}

fn strip_greetings<'a>(words: &[&'a str]) -> Vec<&'a str> {
    let mut kept = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let is_good_greeting = words[i] == "good"
            && matches!(words.get(i + 1), Some(&"morning" | &"afternoon" | &"evening"));
        if is_good_greeting {
            i += 2;
            continue;
        }
        kept.push(words[i]);
        i += 1;
    }
    kept
}

/// Ordered classifiers; the first one with an answer wins.
pub struct ClassifierChain {
    classifiers: Vec<Arc<dyn IntentClassifier>>,
}

impl ClassifierChain {
    pub fn new(classifiers: Vec<Arc<dyn IntentClassifier>>) -> Self {
        Self { classifiers }
    }

    /// Keyword rules only.
    pub fn keyword_only() -> Self {
        Self::new(vec![Arc::new(KeywordClassifier)])
    }

    /// Put a classifier in front of the existing ones.
    pub fn prepend(&mut self, classifier: Arc<dyn IntentClassifier>) {
        self.classifiers.insert(0, classifier);
    }
}

#[async_trait]
impl IntentClassifier for ClassifierChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn classify(&self, text: &str) -> Option<IntentResult> {
        for classifier in &self.classifiers {
            if let Some(result) = classifier.classify(text).await {
                tracing::debug!(
                    classifier = classifier.name(),
                    intent = result.intent.as_str(),
                    confidence = result.confidence,
                    "message classified"
                );
                return Some(result);
            }
        }
        None
    }
}
