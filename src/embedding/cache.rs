//! Query embedding cache.

use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;

use crate::embedding::EmbeddingService;
use crate::LorekeepError;

/// Wraps an [`EmbeddingService`] with a bounded text → vector cache.
///
/// Only successful embeddings are cached. Batch calls go straight through so
/// corpus indexing does not evict hot query entries.
pub struct CachedEmbeddingService {
    inner: Arc<dyn EmbeddingService>,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl CachedEmbeddingService {
    pub fn new(inner: Arc<dyn EmbeddingService>, capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::builder().max_capacity(capacity).build(),
        }
    }

    pub fn cached_entries(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl EmbeddingService for CachedEmbeddingService {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LorekeepError> {
        if let Some(hit) = self.cache.get(text).await {
            return Ok(hit.as_ref().clone());
        }
        let vector = self.inner.embed_text(text).await?;
        self.cache
            .insert(text.to_string(), Arc::new(vector.clone()))
            .await;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LorekeepError> {
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}
