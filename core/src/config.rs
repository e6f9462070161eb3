//! Configuration for the interview assistant.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use interview_embeddings::cache::DEFAULT_CACHE_CAPACITY;
use interview_embeddings::provider::DEFAULT_OPENAI_MODEL;
use interview_embeddings::similarity::DEFAULT_SIMILARITY_THRESHOLD;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::{DEFAULT_CHAT_MODEL, DEFAULT_TEMPERATURE};
use crate::retry::{Backoff, DEFAULT_MAX_ATTEMPTS, MAX_ATTEMPTS_LIMIT};

/// Stored items expire after one day unless configured otherwise.
pub const DEFAULT_EXPIRATION_SECS: u64 = 86_400;

/// Longest wait between two attempts when backoff is enabled.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Configuration for the question and tip services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// OpenAI credentials and endpoint.
    pub openai: OpenAIConfig,

    /// Model used to embed questions and tips.
    pub embedding_model: String,

    /// Maximum number of memoized embeddings.
    pub embedding_cache_capacity: usize,

    /// Model used to generate questions and tips.
    pub chat_model: String,

    /// Sampling temperature (0.0 to 1.0).
    pub temperature: f32,

    /// Cosine similarity at or above which a candidate is a duplicate.
    pub similarity_threshold: f32,

    /// Attempts per generated item before giving up.
    pub max_attempts: u32,

    /// First delay between attempts, doubled after each failure. Zero retries
    /// immediately.
    pub retry_initial_delay_ms: u64,

    /// Cap on the delay between attempts.
    pub retry_max_delay_ms: u64,

    /// Lifetime of stored items, refreshed on every write.
    pub expiration_secs: u64,

    /// Version recorded in every stored item.
    pub app_version: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            openai: OpenAIConfig::default(),
            embedding_model: DEFAULT_OPENAI_MODEL.to_string(),
            embedding_cache_capacity: DEFAULT_CACHE_CAPACITY,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_initial_delay_ms: 0,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            expiration_secs: DEFAULT_EXPIRATION_SECS,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// OpenAI API settings shared by the chat and embedding clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAIConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub base_url: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl AssistantConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_overrides(lookup)
    }

    /// Override fields from environment-style variables returned by `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|key| !key.is_empty()) {
            self.openai.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        if let Some(raw) = lookup("EMBEDDING_CACHE_CAPACITY") {
            self.embedding_cache_capacity = parse_var("EMBEDDING_CACHE_CAPACITY", &raw)?;
        }
        if let Some(model) = lookup("OPENAI_CHAT_MODEL") {
            self.chat_model = model;
        }
        if let Some(raw) = lookup("OPENAI_CHAT_TEMPERATURE") {
            self.temperature = parse_var("OPENAI_CHAT_TEMPERATURE", &raw)?;
        }
        if let Some(raw) = lookup("SIMILARITY_THRESHOLD") {
            self.similarity_threshold = parse_var("SIMILARITY_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("MAX_ATTEMPTS") {
            self.max_attempts = parse_var("MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = lookup("RETRY_INITIAL_DELAY_MS") {
            self.retry_initial_delay_ms = parse_var("RETRY_INITIAL_DELAY_MS", &raw)?;
        }
        if let Some(raw) = lookup("RETRY_MAX_DELAY_MS") {
            self.retry_max_delay_ms = parse_var("RETRY_MAX_DELAY_MS", &raw)?;
        }
        if let Some(raw) = lookup("EXPIRATION_SECONDS") {
            self.expiration_secs = parse_var("EXPIRATION_SECONDS", &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_model.trim().is_empty() {
            return Err(invalid("embedding_model", "must not be empty"));
        }
        if self.chat_model.trim().is_empty() {
            return Err(invalid("chat_model", "must not be empty"));
        }
        if self.embedding_cache_capacity == 0 {
            return Err(invalid("embedding_cache_capacity", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(invalid("temperature", "must be between 0.0 and 1.0"));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(invalid("similarity_threshold", "must be between 0.0 and 1.0"));
        }
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&self.max_attempts) {
            return Err(invalid(
                "max_attempts",
                format!("must be between 1 and {MAX_ATTEMPTS_LIMIT}"),
            ));
        }
        if self.retry_max_delay_ms < self.retry_initial_delay_ms {
            return Err(invalid(
                "retry_max_delay_ms",
                "must not be below retry_initial_delay_ms",
            ));
        }
        if self.expiration_secs == 0 {
            return Err(invalid("expiration_secs", "must be at least 1"));
        }
        Ok(())
    }

    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }

    /// Delay schedule between attempts, or `None` to retry immediately.
    pub fn backoff(&self) -> Option<Backoff> {
        (self.retry_initial_delay_ms > 0).then(|| {
            Backoff::new(
                Duration::from_millis(self.retry_initial_delay_ms),
                Duration::from_millis(self.retry_max_delay_ms),
            )
        })
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| invalid(key, format!("{raw:?}: {e}")))
}
