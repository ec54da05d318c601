use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{CompletionOptions, LlmProvider, Message};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiCompatibleProvider {
    label: &'static str,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(label: &'static str, base_url: String, api_key: String, model: String) -> Self {
        Self {
            label,
            base_url,
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    pub fn openai(api_key: String, model: String) -> Self {
        Self::new("OpenAI", OPENAI_BASE_URL.to_string(), api_key, model)
    }

    pub fn groq(api_key: String, model: String) -> Self {
        Self::new("Groq", GROQ_BASE_URL.to_string(), api_key, model)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.label
    }

    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        options: CompletionOptions,
    ) -> anyhow::Result<String> {
        let mut chat_messages = vec![json!({
            "role": "system",
            "content": system_prompt,
        })];

        for msg in messages {
            chat_messages.push(json!({
                "role": msg.role,
                "content": msg.content,
            }));
        }

        let body = json!({
            "model": self.model,
            "messages": chat_messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to call {} API", self.label))?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {} response", self.label))?;

        if !status.is_success() {
            anyhow::bail!("{} API error ({}): {}", self.label, status, data);
        }

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("missing content in {} response", self.label))
    }
}
