use crate::types::{
    DigestError, DiscoveryConfig, EnrichConfig, HarvestConfig, ModelConfig, PipelineConfig,
    Result, TelegramConfig,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::Level;

pub const DEFAULT_CONFIG_PATH: &str = "feed-digest.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    pub telegram: TelegramConfig,
    pub harvest: HarvestConfig,
    pub enrich: EnrichConfig,
    pub pipeline: PipelineConfig,
    pub discovery: DiscoveryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("feed-digest.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> Result<Level> {
        self.level
            .parse()
            .map_err(|_| DigestError::Config(format!("invalid log level: {}", self.level)))
    }
}

impl Config {
    /// Read the TOML file (a missing file means defaults), then `.env`, then
    /// process environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        accept_missing(dotenvy::dotenv().map(|_| ()))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Export the variables of an env file into the process environment. A
    /// missing file is not an error; a malformed one is.
    pub fn load_env_file(path: &Path) -> Result<()> {
        accept_missing(dotenvy::from_path(path))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DigestError::Config(e.to_string()))
    }

    /// Overlay environment values. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = get("MODEL_ADDRESS") {
            self.model.address = v;
        }
        if let Some(v) = get("MODEL_NAME") {
            self.model.model = v;
        }
        if let Some(v) = get("MODEL_USERNAME") {
            self.model.username = v;
        }
        if let Some(v) = get("MODEL_PASSWORD") {
            self.model.password = v;
        }
        if let Some(v) = get("TG_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = get("TG_CHAT_ID") {
            self.telegram.chat_id = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.harvest.concurrency == 0 {
            return Err(DigestError::Config("harvest.concurrency must be at least 1".into()));
        }
        if self.harvest.request_timeout_seconds == 0 {
            return Err(DigestError::Config(
                "harvest.request_timeout_seconds must be positive".into(),
            ));
        }
        if self.enrich.summary_max_attempts == 0 {
            return Err(DigestError::Config(
                "enrich.summary_max_attempts must be at least 1".into(),
            ));
        }
        if self.pipeline.interval_hours == 0 {
            return Err(DigestError::Config("pipeline.interval_hours must be positive".into()));
        }
        self.logging.level()?;
        Ok(())
    }
}

fn accept_missing(result: dotenvy::Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(DigestError::Config(format!("invalid .env file: {e}"))),
    }
}
