use crate::traits::ModelBackend;
use crate::types::{DigestError, ModelConfig, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

/// Model backend speaking the OpenAI-compatible `/v1/chat/completions` API.
pub struct ChatCompletionAdapter {
    client: Client,
    endpoint: String,
    config: ModelConfig,
}

impl ChatCompletionAdapter {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let endpoint = format!("{}/v1/chat/completions", config.address.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }
}

#[async_trait]
impl ModelBackend for ChatCompletionAdapter {
    fn backend_name(&self) -> String {
        format!("chat-completions ({})", self.config.model)
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.config.temperature,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if !self.config.username.is_empty() {
            builder = builder.basic_auth(&self.config.username, Some(&self.config.password));
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DigestError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| DigestError::MalformedOutput {
                reason: "no choices in response".to_string(),
                raw: String::new(),
            })?;

        debug!("Model returned {} chars", content.len());
        Ok(content)
    }
}

/// Remove a Markdown code fence wrapping the whole response, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}

/// Replace typographic quotes with their ASCII counterparts.
pub fn normalize_quotes(raw: &str) -> String {
    raw.replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

/// Model output is untrusted text: repair the common wrappers before parsing.
pub fn clean_response(raw: &str) -> String {
    normalize_quotes(strip_code_fence(raw))
}

/// Clean a model response and parse it as JSON.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let cleaned = clean_response(raw);
    serde_json::from_str(&cleaned).map_err(|e| DigestError::MalformedOutput {
        reason: e.to_string(),
        raw: cleaned,
    })
}
