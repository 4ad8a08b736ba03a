use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
// Use the interfaces crate for the shared data model
pub use interfaces::defs::{
    Enrichment, Item, ItemId, ItemWithEnrichment, NewItem, RawFeedItem, Source, SubScores,
};
pub use interfaces::window::{UnknownWindow, Window};

pub const DEFAULT_FEED_PATHS: [&str; 7] = [
    "/feed",
    "/rss",
    "/atom.xml",
    "/feed.xml",
    "/rss.xml",
    "/index.xml",
    "/feeds/all.atom.xml",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub user_agent: String,
    pub concurrency: usize,
    pub request_timeout_seconds: u64,
    pub max_items_per_source: usize,
    pub summary_max_chars: usize,
    pub scheme: String,
    pub feed_paths: Vec<String>,
    pub max_redirects: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            user_agent: "Feed-Digest/1.0".to_string(),
            concurrency: 10,
            request_timeout_seconds: 15,
            max_items_per_source: 10,
            summary_max_chars: 500,
            scheme: "https".to_string(),
            feed_paths: DEFAULT_FEED_PATHS.iter().map(|p| p.to_string()).collect(),
            max_redirects: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub lookback: Window,
    pub summary_max_attempts: u32,
    pub summary_retry_delay_seconds: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            lookback: Window::Week,
            summary_max_attempts: 3,
            summary_retry_delay_seconds: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub delivery_window: Window,
    pub max_undelivered: usize,
    pub deliver_without_trends: bool,
    pub refresh_sources: bool,
    pub interval_hours: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delivery_window: Window::Week,
            max_undelivered: 20,
            deliver_without_trends: true,
            refresh_sources: false,
            interval_hours: 6,
        }
    }
}

/// OpenAI-compatible chat completion endpoint (Ollama, vLLM, ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub address: String,
    pub model: String,
    pub username: String,
    pub password: String,
    pub temperature: f64,
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:11434".to_string(),
            model: "gemma3:4b".to_string(),
            username: String::new(),
            password: String::new(),
            temperature: 0.3,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
    pub timeout_seconds: u64,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: "https://api.telegram.org".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub base_url: String,
    pub limit: usize,
    pub timeout_seconds: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://hn-popularity.cdn.refactoringenglish.com".to_string(),
            limit: 100,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discover,
    Harvest,
    Enrich,
    RetrySummaries,
    Select,
    Aggregate,
    Deliver,
    MarkDelivered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

/// Outcome of one end-to-end pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub discovered: usize,
    pub harvested: usize,
    pub enriched: usize,
    pub summarized: usize,
    pub delivered: usize,
    pub cancelled: bool,
    pub errors: Vec<StageError>,
}

impl CycleReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at,
            discovered: 0,
            harvested: 0,
            enriched: 0,
            summarized: 0,
            delivered: 0,
            cancelled: false,
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, stage: Stage, error: impl ToString) {
        self.errors.push(StageError {
            stage,
            message: error.to_string(),
        });
    }

    pub fn failed_stages(&self) -> Vec<Stage> {
        self.errors.iter().map(|e| e.stage).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Model backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Malformed model output: {reason} (raw: {raw})")]
    MalformedOutput { reason: String, raw: String },

    #[error("Timed out after {seconds}s: {url}")]
    Timeout { url: String, seconds: u64 },

    #[error("No feed found for {domain}")]
    NoFeed { domain: String },

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    UnknownWindow(#[from] UnknownWindow),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<DigestError> },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

impl DigestError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DigestError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, DigestError>;
