//! Local embedding model on candle.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::embedding::candle_backend::{download_model, select_device, BertEncoder};
use crate::embedding::EmbeddingService;
use crate::LorekeepError;

/// Local embedding service backed by a candle BERT encoder.
///
/// The encoder is immutable after load and shared through an `Arc`; inference
/// runs on the blocking pool.
pub struct LocalEmbeddingService {
    encoder: Option<Arc<BertEncoder>>,
    dimensions: usize,
}

impl LocalEmbeddingService {
    /// Download (or reuse the hub cache for) `repo_id` and load it.
    ///
    /// Load failures do not error: the service reports itself unavailable and
    /// callers degrade to zero semantic scores.
    pub async fn load(repo_id: &str) -> Self {
        let repo = repo_id.to_string();
        let loaded = tokio::task::spawn_blocking(move || {
            let files = download_model(&repo)?;
            BertEncoder::new(&files, select_device())
        })
        .await;

        match loaded {
            Ok(Ok(encoder)) => {
                info!(model = repo_id, "Embedding model loaded");
                Self {
                    dimensions: encoder.hidden_size(),
                    encoder: Some(Arc::new(encoder)),
                }
            }
            Ok(Err(e)) => {
                warn!(
                    "Failed to load embedding model {}: {}. Embedding service will be unavailable.",
                    repo_id, e
                );
                Self::unavailable()
            }
            Err(e) => {
                warn!("Embedding model load task failed: {}", e);
                Self::unavailable()
            }
        }
    }

    fn unavailable() -> Self {
        Self {
            encoder: None,
            dimensions: 384,
        }
    }

    fn encoder(&self) -> Result<Arc<BertEncoder>, LorekeepError> {
        self.encoder
            .clone()
            .ok_or_else(|| LorekeepError::Embedding("Embedding model not loaded".to_string()))
    }
}

#[async_trait]
impl EmbeddingService for LocalEmbeddingService {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LorekeepError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LorekeepError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LorekeepError> {
        let encoder = self.encoder()?;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut out = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(32) {
                out.extend(encoder.embed(chunk)?);
            }
            Ok::<Vec<Vec<f32>>, anyhow::Error>(out)
        })
        .await
        .map_err(|e| LorekeepError::Embedding(format!("Task join error: {}", e)))?
        .map_err(|e| LorekeepError::Embedding(format!("Embedding error: {}", e)))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_available(&self) -> bool {
        self.encoder.is_some()
    }
}
