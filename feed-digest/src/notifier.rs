use crate::digest::escape_html;
use crate::traits::Notifier;
use crate::types::{DigestError, Result, TelegramConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    description: String,
}

/// Delivers digests through the Telegram Bot API `sendMessage` method.
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(DigestError::Config(
                "telegram bot token and chat id are required".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    /// `None` when the channel is not configured.
    pub fn from_config(config: &TelegramConfig) -> Result<Option<Self>> {
        if !config.is_configured() {
            return Ok(None);
        }
        Self::new(config.clone()).map(Some)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    async fn send_chunk(&self, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: &self.config.chat_id,
            text,
            parse_mode: "HTML",
        };

        let response = self.client.post(self.endpoint()).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let api: ApiResponse = serde_json::from_str(&body).unwrap_or_default();
            return Err(DigestError::Delivery(format!(
                "telegram API {}: {}",
                status.as_u16(),
                api.description
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn channel_name(&self) -> String {
        "telegram".to_string()
    }

    async fn send(&self, title: &str, body: &str) -> Result<()> {
        let text = if title.is_empty() {
            body.to_string()
        } else {
            format!("<b>{}</b>\n\n{}", escape_html(title), body)
        };

        let chunks = split_message(&text, MAX_MESSAGE_CHARS);
        debug!(chunks = chunks.len(), "sending telegram message");
        for chunk in &chunks {
            self.send_chunk(chunk).await?;
        }

        info!("Sent digest to Telegram in {} message(s)", chunks.len());
        Ok(())
    }
}

/// Split text into chunks of at most `max_chars` characters, preferring
/// paragraph breaks, then line breaks, then a hard cut on a char boundary.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_chars {
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let head = &rest[..limit];

        let cut = match head.rfind("\n\n") {
            Some(idx) if idx > 0 => idx,
            _ => match head.rfind('\n') {
                Some(idx) if idx > 0 => idx,
                _ => limit,
            },
        };

        chunks.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start_matches('\n');
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
