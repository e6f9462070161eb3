//! # Interview Core
//!
//! Generates interview questions and tips that are semantically different
//! from what a user (or a question) already has, and keeps them in a
//! key-value store with a sliding expiration.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │            QuestionService              TipService              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  UniqueGenerator ──► ContentGenerator (chat completions)        │
//! │       │         ──► Embedder (similarity against the scope)     │
//! │       ▼                                                         │
//! │  RetryPolicy                   Storage ──► KeyValueStore        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod config;
pub mod content;
pub mod error;
pub mod kv;
pub mod llm;
pub mod prompt;
pub mod retry;
pub mod schema;
pub mod service;
pub mod storage;
pub mod unique;

pub use assistant::InterviewAssistant;
pub use config::AssistantConfig;
pub use content::{ContentGenerator, ContentStream};
pub use error::{
    AttemptError, ConfigError, GenerationError, Result, RetryError, ServiceError, StorageError,
    StoreError,
};
pub use kv::{KeyValueStore, MemoryStore, WriteBatch};
pub use retry::{Backoff, RetryPolicy};
pub use schema::{
    GeneratedQuestion, GeneratedTip, JobTitle, Metadata, QuestionContent,
    QuestionGenerationRequest, QuestionType, TipContent, TipGenerationRequest,
};
pub use service::{QuestionService, TipService};
pub use storage::{QuestionStorage, Storage, TipStorage};
pub use unique::{Scope, StreamChunk, UniqueGenerator};
