pub mod classifier;
pub mod extractor;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 300,
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        options: CompletionOptions,
    ) -> anyhow::Result<String>;
}

/// Pull a JSON object out of a model reply: raw, inside a markdown fence, or
/// embedded in surrounding prose. `None` when nothing parses as `T`.
pub fn parse_json_reply<T: DeserializeOwned>(response: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str::<T>(response) {
        return Some(value);
    }

    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(value) = serde_json::from_str::<T>(cleaned) {
        return Some(value);
    }

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<T>(&cleaned[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        intent: String,
    }

    #[test]
    fn test_parse_raw_json() {
        let reply: Option<Reply> = parse_json_reply(r#"{"intent":"GREETING"}"#);
        assert_eq!(reply.unwrap().intent, "GREETING");
    }

    #[test]
    fn test_parse_markdown_fenced_json() {
        let reply: Option<Reply> = parse_json_reply("```json\n{\"intent\":\"HELP\"}\n```");
        assert_eq!(reply.unwrap().intent, "HELP");
    }

    #[test]
    fn test_parse_json_inside_prose() {
        let reply: Option<Reply> =
            parse_json_reply("Sure! Here you go: {\"intent\":\"UNKNOWN\"} Hope that helps.");
        assert_eq!(reply.unwrap().intent, "UNKNOWN");
    }

    #[test]
    fn test_parse_failure_is_none() {
        let reply: Option<Reply> = parse_json_reply("I don't understand the format you want");
        assert!(reply.is_none());
        let reply: Option<Reply> = parse_json_reply("} backwards {");
        assert!(reply.is_none());
    }
}
