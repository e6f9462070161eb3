//! Error types for interview content generation.

use std::path::PathBuf;

use http::StatusCode;
use interview_embeddings::EmbeddingError;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias, defaulting to the caller-facing error.
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

/// Failures of a content generator.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// No API key available for the chat provider.
    #[error("chat provider not configured (set OPENAI_API_KEY)")]
    NotConfigured,

    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The model declined to answer.
    #[error("model refused: {0}")]
    Refusal(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The model answered but the content does not fit the schema.
    #[error("failed to parse generated content: {0}")]
    Parse(String),

    /// The terminal content was requested before the stream finished.
    #[error("nothing generated yet")]
    NothingGenerated,

    #[error("stream error: {0}")]
    Stream(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a single attempt of the uniqueness loop did not produce content.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    /// The candidate is too similar to content already in scope.
    #[error("generated {kind} is too similar to existing ones")]
    Duplicate { kind: &'static str },
}

impl AttemptError {
    /// Missing credentials fail every attempt the same way.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AttemptError::Generation(GenerationError::NotConfigured)
                | AttemptError::Embedding(EmbeddingError::ProviderNotConfigured)
        )
    }
}

/// Raised once a retry policy gives up.
#[derive(Error, Debug)]
#[error("'{operation}' {label} after {attempts} attempts. Last error: {source}")]
pub struct RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub operation: &'static str,
    pub label: String,
    /// Attempts actually made, at most the policy's maximum.
    pub attempts: u32,
    #[source]
    pub source: E,
}

/// Errors raised by a key-value store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A write batch guard found the key already present.
    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("wrong type for key {key}: expected {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors raised by the persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Identifier collision on insert. Never retried.
    #[error("{kind} with ID {id} already exists")]
    Collision { kind: &'static str, id: Uuid },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced to callers of the generation services.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("question for id {0} does not exist")]
    QuestionNotFound(Uuid),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Retry budget consumed without an accepted candidate.
    #[error(transparent)]
    Exhausted(#[from] RetryError<AttemptError>),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Embedding the existing scope failed before generation started.
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl ServiceError {
    /// HTTP status an API layer should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::QuestionNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Exhausted(_) | ServiceError::Storage(_) | ServiceError::Embedding(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
