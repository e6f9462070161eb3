//! The `Embedder` ties a provider, its memo cache and the similarity policy
//! together behind the three operations the generation loop needs.

use std::sync::Arc;

use crate::Embedding;
use crate::cache::{CacheStats, CachedProvider, EmbeddingCache};
use crate::error::Result;
use crate::provider::{EmbeddingProvider, EmbeddingRequest};
use crate::similarity::SimilarityChecker;

/// Cached text embedding plus duplicate detection.
pub struct Embedder {
    provider: CachedProvider<Arc<dyn EmbeddingProvider>>,
    checker: SimilarityChecker,
}

impl Embedder {
    /// Create an embedder over `provider` with its own cache.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: EmbeddingCache,
        checker: SimilarityChecker,
    ) -> Self {
        Self {
            provider: CachedProvider::new(provider, cache),
            checker,
        }
    }

    /// Embed `text`. Identical texts are served from the cache.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        let response = self.provider.embed(EmbeddingRequest::new(text)).await?;
        Ok(response.embedding)
    }

    /// Embed every text in order.
    pub async fn embed_all<S>(&self, texts: &[S]) -> Result<Vec<Embedding>>
    where
        S: AsRef<str>,
    {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text.as_ref()).await?);
        }
        Ok(embeddings)
    }

    /// Whether the two embeddings are below the similarity threshold.
    pub fn are_different(&self, a: &[f32], b: &[f32]) -> Result<bool> {
        self.checker.are_different(a, b)
    }

    /// Whether `candidate` is below the threshold against every entry of
    /// `others`. True for an empty list.
    pub fn all_different<E>(&self, candidate: &[f32], others: &[E]) -> Result<bool>
    where
        E: AsRef<[f32]>,
    {
        self.checker.is_different_from_all(candidate, others)
    }

    pub fn threshold(&self) -> f32 {
        self.checker.threshold()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.provider.cache().stats().await
    }
}
