//! Bounded memo of embeddings so repeated texts skip the provider.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::Embedding;
use crate::error::Result;
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};

/// Number of entries kept when no capacity is configured.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    model: String,
    text: String,
}

/// Bounded, least-recently-used cache of embeddings keyed by model and text.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<CacheKey, Embedding>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Create a new in-memory cache holding at most `max_entries` embeddings.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(text: &str, model: &str) -> CacheKey {
        CacheKey {
            model: model.to_string(),
            text: text.to_string(),
        }
    }

    /// Get an embedding from the cache, marking it as recently used.
    pub async fn get(&self, text: &str, model: &str) -> Option<Embedding> {
        let found = self
            .entries
            .lock()
            .await
            .get(&Self::key(text, model))
            .cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Put an embedding in the cache, evicting the least recently used entry
    /// when full.
    pub async fn put(&self, text: &str, model: &str, embedding: Embedding) {
        let mut entries = self.entries.lock().await;
        if let Some((evicted, _)) = entries.push(Self::key(text, model), embedding) {
            if evicted.text != text || evicted.model != model {
                debug!("Evicted least recently used embedding (model: {})", evicted.model);
            }
        }
        debug!("Stored embedding (model: {model})");
    }

    /// Check if an embedding is cached without touching its recency.
    pub async fn contains(&self, text: &str, model: &str) -> bool {
        self.entries.lock().await.contains(&Self::key(text, model))
    }

    /// Drop every entry. Hit and miss counters are kept.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        info!("Embedding cache emptied");
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().await;
        CacheStats {
            entries: entries.len(),
            max_entries: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Occupancy and hit counters of an [`EmbeddingCache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,

    /// Capacity the cache evicts at.
    pub max_entries: usize,

    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that had to go to the provider.
    pub misses: u64,
}

/// Provider decorator that answers repeated (model, text) pairs from an
/// [`EmbeddingCache`].
pub struct CachedProvider<P> {
    provider: P,
    cache: EmbeddingCache,
}

impl<P> CachedProvider<P>
where
    P: EmbeddingProvider,
{
    pub fn new(provider: P, cache: EmbeddingCache) -> Self {
        Self { provider, cache }
    }

    /// Embed `request`, consulting the cache first. Cache hits report no
    /// token usage.
    pub async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string());

        if let Some(embedding) = self.cache.get(&request.text, &model).await {
            debug!("Embedding served from cache (model: {model})");
            let dimension = embedding.len();
            return Ok(EmbeddingResponse {
                embedding,
                model,
                dimension,
                tokens_used: None,
            });
        }

        let text = request.text.clone();
        let response = self.provider.embed(request).await?;
        self.cache
            .put(&text, &model, response.embedding.clone())
            .await;

        Ok(response)
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn default_model(&self) -> &str {
            "counting-model"
        }

        fn default_dimension(&self) -> usize {
            1
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EmbeddingResponse {
                embedding: vec![request.text.len() as f32],
                model: self.default_model().to_string(),
                dimension: 1,
                tokens_used: None,
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_entries_are_keyed_by_model_and_text() {
        let cache = EmbeddingCache::default();
        cache.put("window functions", "small", vec![0.5, 0.5]).await;

        assert_eq!(
            cache.get("window functions", "small").await,
            Some(vec![0.5, 0.5])
        );
        assert_eq!(cache.get("window functions", "large").await, None);
        assert_eq!(cache.get("partitioning", "small").await, None);

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (1, 2));
        assert_eq!(stats.max_entries, DEFAULT_CACHE_CAPACITY);
    }

    #[tokio::test]
    async fn test_clear_empties_entries() {
        let cache = EmbeddingCache::new(0);
        cache.put("x", "m", vec![1.0]).await;
        assert_eq!(cache.stats().await.max_entries, 1);

        cache.clear().await;
        assert!(!cache.contains("x", "m").await);
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_cache_evicts_least_recently_used() {
        let cache = EmbeddingCache::new(2);

        cache.put("a", "model", vec![1.0]).await;
        cache.put("b", "model", vec![2.0]).await;
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a", "model").await.is_some());
        cache.put("c", "model", vec![3.0]).await;

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 2);
        assert!(cache.contains("a", "model").await);
        assert!(!cache.contains("b", "model").await);
        assert!(cache.contains("c", "model").await);
    }

    #[tokio::test]
    async fn test_cached_provider_calls_provider_once_per_text() {
        let cached = CachedProvider::new(
            CountingProvider {
                calls: AtomicUsize::new(0),
            },
            EmbeddingCache::new(8),
        );

        let first = cached.embed(EmbeddingRequest::new("same")).await.unwrap();
        let second = cached.embed(EmbeddingRequest::new("same")).await.unwrap();
        cached.embed(EmbeddingRequest::new("other")).await.unwrap();

        assert_eq!(first.embedding, second.embedding);
        assert_eq!(cached.provider().calls.load(Ordering::SeqCst), 2);
        let stats = cached.cache().stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }
}
