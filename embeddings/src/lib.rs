//! Embeddings and near-duplicate detection for generated interview content.
//!
//! Texts are embedded through an [`EmbeddingProvider`], memoised in a bounded
//! LRU [`EmbeddingCache`], and compared by cosine similarity. Two texts are
//! duplicates when their similarity reaches the configured threshold.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Embedder                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  CachedProvider ──► EmbeddingCache (LRU)                        │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  EmbeddingProvider (OpenAI)        SimilarityChecker            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod embedder;
pub mod error;
pub mod provider;
pub mod similarity;

pub use cache::{CacheStats, CachedProvider, EmbeddingCache};
pub use embedder::Embedder;
pub use error::{EmbeddingError, Result};
pub use provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider};
pub use similarity::{SimilarityChecker, cosine_similarity};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
