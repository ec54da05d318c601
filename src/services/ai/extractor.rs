use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;

use super::{parse_json_reply, CompletionOptions, LlmProvider, Message};
use crate::models::{AppointmentDraft, ExtractedDetails};
use crate::services::timeparse;

/// What an extractor may look at besides the utterance.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub now: NaiveDateTime,
    pub draft: Option<AppointmentDraft>,
}

/// Pulls appointment hints out of free text. `None` means nothing usable was found.
#[async_trait]
pub trait DetailExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, text: &str, context: &ExtractionContext) -> Option<ExtractedDetails>;
}

const EXTRACTOR_PROMPT: &str = r#"You extract appointment details from a message sent to a booking assistant.

Return ONLY a JSON object with these fields, using null for anything not mentioned:
{"start_time": "ISO datetime such as 2026-07-07T15:00:00", "end_time": "ISO datetime or null", "duration": "minutes as an integer or null", "title": "meeting type or null", "description": "extra details or null"}

Resolve relative expressions ("tomorrow", "next Monday") against the current date and time given below.

Examples (current time 2026-06-28 10:00):
- "Tomorrow at 3 PM for 1 hour" -> {"start_time": "2026-06-29T15:00:00", "duration": 60, "title": "Meeting"}
- "Book a meeting between 3-5 PM next week" -> {"start_time": "2026-07-06T15:00:00", "end_time": "2026-07-06T17:00:00", "title": "Meeting"}
- "today at 9pm for an hour" -> {"start_time": "2026-06-28T21:00:00", "duration": 60}
"#;

pub struct LlmExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl LlmExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    fn system_prompt(context: &ExtractionContext) -> String {
        let draft = context.draft.clone().unwrap_or_default();
        let fmt = |dt: Option<NaiveDateTime>| {
            dt.map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
                .unwrap_or_else(|| "None".to_string())
        };
        format!(
            "{EXTRACTOR_PROMPT}\nCurrent date/time: {}\n\nCurrent appointment info:\n- Title: {}\n- Start time: {}\n- Duration: {} minutes",
            context.now.format("%Y-%m-%d %H:%M (%A)"),
            draft.title.as_deref().unwrap_or("None"),
            fmt(draft.start),
            draft
                .duration_minutes
                .map(|m| m.to_string())
                .unwrap_or_else(|| "None".to_string()),
        )
    }
}

#[async_trait]
impl DetailExtractor for LlmExtractor {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn extract(&self, text: &str, context: &ExtractionContext) -> Option<ExtractedDetails> {
        let options = CompletionOptions {
            temperature: 0.0,
            max_tokens: 200,
        };
        let response = match self
            .llm
            .complete(&Self::system_prompt(context), &[Message::user(text)], options)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(provider = self.llm.name(), error = %e, "detail extraction failed");
                return None;
            }
        };

        let Some(reply) = parse_json_reply::<Value>(&response) else {
            tracing::warn!(provider = self.llm.name(), "failed to parse extractor reply as JSON");
            return None;
        };

        let details = details_from_reply(&reply);
        (!details.is_empty()).then_some(details)
    }
}

/// Each field is read on its own; anything malformed is simply left out.
fn details_from_reply(reply: &Value) -> ExtractedDetails {
    ExtractedDetails {
        start: text_field(reply, "start_time").and_then(|s| timeparse::parse_local_datetime(&s)),
        end: text_field(reply, "end_time").and_then(|s| timeparse::parse_local_datetime(&s)),
        duration_minutes: duration_field(&reply["duration"]),
        title: text_field(reply, "title"),
        description: text_field(reply, "description"),
    }
}

fn text_field(reply: &Value, key: &str) -> Option<String> {
    reply[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null") && !s.eq_ignore_ascii_case("none"))
        .map(str::to_string)
}

/// Minutes from a number, a numeric string, or a phrase with units ("1.5 hours").
/// The prompt asks for whole minutes, so a small fractional value is read as hours.
fn duration_field(value: &Value) -> Option<i64> {
    let minutes = match value {
        Value::Number(n) => n.as_f64().and_then(minutes_from_number),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(number) => minutes_from_number(number),
            Err(_) => timeparse::parse_duration(s),
        },
        _ => None,
    }?;
    (minutes > 0).then_some(minutes.min(timeparse::DURATION_CEILING_MINUTES))
}

fn minutes_from_number(number: f64) -> Option<i64> {
    if !number.is_finite() || number <= 0.0 {
        return None;
    }
    let minutes = if number.fract() != 0.0 && number < 24.0 {
        number * 60.0
    } else {
        number
    };
    Some(minutes.round() as i64)
}

/// Deterministic extractor built on the rule-based time parser.
pub struct RuleExtractor;

#[async_trait]
impl DetailExtractor for RuleExtractor {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn extract(&self, text: &str, context: &ExtractionContext) -> Option<ExtractedDetails> {
        let hints = timeparse::extract_hints(text, context.now);
        (!hints.is_empty()).then_some(hints)
    }
}

/// Ordered extractors; the first one with a result wins.
pub struct ExtractorChain {
    extractors: Vec<Arc<dyn DetailExtractor>>,
}

impl ExtractorChain {
    pub fn new(extractors: Vec<Arc<dyn DetailExtractor>>) -> Self {
        Self { extractors }
    }

    pub fn rules_only() -> Self {
        Self::new(vec![Arc::new(RuleExtractor)])
    }

    pub fn prepend(&mut self, extractor: Arc<dyn DetailExtractor>) {
        self.extractors.insert(0, extractor);
    }
}

#[async_trait]
impl DetailExtractor for ExtractorChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn extract(&self, text: &str, context: &ExtractionContext) -> Option<ExtractedDetails> {
        for extractor in &self.extractors {
            if let Some(details) = extractor.extract(text, context).await {
                tracing::debug!(extractor = extractor.name(), "details extracted");
                return Some(details);
            }
        }
        None
    }
}
