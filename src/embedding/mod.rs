//! Text embeddings for similarity search.
//!
//! [`EmbeddingService`] abstracts the model so stores, retrievers and tests
//! can swap implementations. [`LocalEmbeddingService`] runs BGE-small-en-v1.5
//! on candle; [`CachedEmbeddingService`] memoizes query embeddings.

pub mod cache;
pub mod candle_backend;
pub mod model;

use async_trait::async_trait;

use crate::LorekeepError;

pub use cache::CachedEmbeddingService;
pub use model::LocalEmbeddingService;

/// No-op embedding service.
///
/// Always reports as unavailable and returns errors for embed operations.
/// Used when embeddings are disabled in config and in tests that rank on
/// entity matches alone.
pub struct NoopEmbeddingService;

impl Default for NoopEmbeddingService {
    fn default() -> Self {
        Self::new()
    }
}

impl NoopEmbeddingService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmbeddingService for NoopEmbeddingService {
    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, LorekeepError> {
        Err(LorekeepError::Embedding(
            "Embedding service is not available (noop)".to_string(),
        ))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, LorekeepError> {
        Err(LorekeepError::Embedding(
            "Embedding service is not available (noop)".to_string(),
        ))
    }

    fn dimensions(&self) -> usize {
        384
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Service trait for generating text embeddings.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate embedding for a single text string.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LorekeepError>;

    /// Generate embeddings for multiple texts in batch, one per input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LorekeepError>;

    /// Embedding dimensions (384 for BGE-small).
    fn dimensions(&self) -> usize;

    /// Returns false if the model failed to load (e.g. no internet on first run).
    fn is_available(&self) -> bool;
}
