//! Append-only feedback and classifier comparison log.
//!
//! Records are created once per served query and never edited. Corrections
//! reference a record by id. Comparison against the fallback classifier is
//! observational: it is recorded alongside the served predictions and never
//! feeds back into routing.

pub mod surreal;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::classifier::FallbackClassifier;
use crate::config::FeedbackConfig;
use crate::models::{
    predictions_agree, ComparisonResult, FeedbackCorrection, FeedbackRecord, ToolPrediction,
};
use crate::LorekeepError;

pub use surreal::SurrealFeedbackStore;

/// Append-only persistence for feedback.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Fails if a record with the same id exists.
    async fn append_record(&self, record: &FeedbackRecord) -> Result<(), LorekeepError>;

    async fn append_correction(&self, correction: &FeedbackCorrection) -> Result<(), LorekeepError>;

    async fn get_record(&self, id: &str) -> Result<Option<FeedbackRecord>, LorekeepError>;

    /// Corrections for a record, oldest first.
    async fn corrections_for(&self, record_id: &str) -> Result<Vec<FeedbackCorrection>, LorekeepError>;

    /// Most recent records, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>, LorekeepError>;
}

/// In-process store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryFeedbackStore {
    records: RwLock<Vec<FeedbackRecord>>,
    corrections: RwLock<Vec<FeedbackCorrection>>,
}

impl MemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackStore for MemoryFeedbackStore {
    async fn append_record(&self, record: &FeedbackRecord) -> Result<(), LorekeepError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(LorekeepError::Validation(format!(
                "Feedback record '{}' already exists",
                record.id
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn append_correction(&self, correction: &FeedbackCorrection) -> Result<(), LorekeepError> {
        self.corrections.write().await.push(correction.clone());
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<Option<FeedbackRecord>, LorekeepError> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn corrections_for(&self, record_id: &str) -> Result<Vec<FeedbackCorrection>, LorekeepError> {
        Ok(self
            .corrections
            .read()
            .await
            .iter()
            .filter(|c| c.record_id == record_id)
            .cloned()
            .collect())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>, LorekeepError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

/// A record together with every correction filed against it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FeedbackEntry {
    pub record: FeedbackRecord,
    pub corrections: Vec<FeedbackCorrection>,
}

/// Front end over a [`FeedbackStore`] plus the optional comparison backend.
pub struct FeedbackLogger {
    store: Arc<dyn FeedbackStore>,
    fallback: Option<Arc<dyn FallbackClassifier>>,
    enabled: bool,
    comparison_timeout: Duration,
}

impl FeedbackLogger {
    /// Comparison runs only when enabled in config and a fallback is given.
    pub fn new(
        store: Arc<dyn FeedbackStore>,
        fallback: Option<Arc<dyn FallbackClassifier>>,
        config: &FeedbackConfig,
    ) -> Self {
        Self {
            store,
            fallback: if config.comparison { fallback } else { None },
            enabled: config.enabled,
            comparison_timeout: Duration::from_millis(config.comparison_timeout_ms),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn comparison_enabled(&self) -> bool {
        self.enabled && self.fallback.is_some()
    }

    /// Run the fallback classifier on the same text and compare.
    ///
    /// `None` when comparison is off, or when the fallback fails or times
    /// out. Never affects the served predictions.
    pub async fn compare(&self, text: &str, served: &[ToolPrediction]) -> Option<ComparisonResult> {
        if !self.enabled {
            return None;
        }
        let fallback = self.fallback.as_ref()?;
        match tokio::time::timeout(self.comparison_timeout, fallback.classify(text)).await {
            Ok(Ok(predictions)) => {
                let agrees = predictions_agree(served, &predictions);
                debug!(backend = fallback.name(), agrees, "Comparison classifier finished");
                Some(ComparisonResult {
                    backend: fallback.name().to_string(),
                    predictions,
                    agrees,
                })
            }
            Ok(Err(e)) => {
                warn!(backend = fallback.name(), "Comparison classifier failed: {}", e);
                None
            }
            Err(_) => {
                warn!(
                    backend = fallback.name(),
                    timeout_ms = self.comparison_timeout.as_millis() as u64,
                    "Comparison classifier timed out"
                );
                None
            }
        }
    }

    /// Append a record for a served query. Returns `None` when logging is
    /// disabled.
    pub async fn log(
        &self,
        query: &str,
        predictions: &[ToolPrediction],
        comparison: Option<ComparisonResult>,
    ) -> Result<Option<FeedbackRecord>, LorekeepError> {
        if !self.enabled {
            return Ok(None);
        }
        let record = FeedbackRecord::new(query, predictions.to_vec()).with_comparison(comparison);
        self.store.append_record(&record).await?;
        debug!(record_id = %record.id, "Logged routing decision");
        Ok(Some(record))
    }

    /// File a correction against an existing record.
    pub async fn submit(
        &self,
        record_id: &str,
        is_correct: bool,
        corrected_predictions: Option<Vec<ToolPrediction>>,
        notes: Option<String>,
    ) -> Result<FeedbackCorrection, LorekeepError> {
        if self.store.get_record(record_id).await?.is_none() {
            return Err(LorekeepError::NotFound {
                entity_type: "feedback_record".to_string(),
                id: record_id.to_string(),
            });
        }
        let correction =
            FeedbackCorrection::new(record_id, is_correct, corrected_predictions, notes);
        self.store.append_correction(&correction).await?;
        info!(record_id, is_correct, "Recorded feedback");
        Ok(correction)
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<FeedbackEntry>, LorekeepError> {
        let mut entries = Vec::new();
        for record in self.store.recent(limit).await? {
            let corrections = self.store.corrections_for(&record.id).await?;
            entries.push(FeedbackEntry {
                record,
                corrections,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;

    struct FixedFallback(Vec<ToolPrediction>);

    #[async_trait]
    impl FallbackClassifier for FixedFallback {
        fn name(&self) -> &str {
            "fixed-llm"
        }

        async fn classify(&self, _text: &str) -> Result<Vec<ToolPrediction>, LorekeepError> {
            Ok(self.0.clone())
        }
    }

    fn served() -> Vec<ToolPrediction> {
        vec![ToolPrediction::new(Source::CharacterData, "combat_info", 0.95)]
    }

    fn logger(fallback: Option<Arc<dyn FallbackClassifier>>, comparison: bool) -> FeedbackLogger {
        FeedbackLogger::new(
            Arc::new(MemoryFeedbackStore::new()),
            fallback,
            &FeedbackConfig {
                comparison,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_corrections_never_edit_the_record() {
        let logger = logger(None, false);
        let record = logger
            .log("What is my AC?", &served(), None)
            .await
            .unwrap()
            .unwrap();

        logger
            .submit(
                &record.id,
                false,
                Some(vec![ToolPrediction::new(Source::Rulebook, "combat_rules", 1.0)]),
                Some("wanted the rule".into()),
            )
            .await
            .unwrap();

        let history = logger.history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].record, record);
        assert_eq!(history[0].corrections.len(), 1);
        assert!(!history[0].corrections[0].is_correct);
    }

    #[tokio::test]
    async fn test_unknown_record_is_not_found() {
        let err = logger(None, false)
            .submit("missing", true, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LorekeepError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_comparison_records_agreement() {
        let agreeing = logger(Some(Arc::new(FixedFallback(served()))), true);
        let result = agreeing.compare("What is my AC?", &served()).await.unwrap();
        assert!(result.agrees);
        assert_eq!(result.backend, "fixed-llm");

        let disagreeing = logger(
            Some(Arc::new(FixedFallback(vec![ToolPrediction::new(
                Source::Rulebook,
                "combat_rules",
                0.8,
            )]))),
            true,
        );
        assert!(!disagreeing.compare("What is my AC?", &served()).await.unwrap().agrees);
    }

    #[tokio::test]
    async fn test_comparison_off_unless_configured() {
        let off = logger(Some(Arc::new(FixedFallback(served()))), false);
        assert!(!off.comparison_enabled());
        assert!(off.compare("What is my AC?", &served()).await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_record_rejected() {
        let store = MemoryFeedbackStore::new();
        let record = FeedbackRecord::new("q", served());
        store.append_record(&record).await.unwrap();
        assert!(store.append_record(&record).await.is_err());
    }
}
