//! Large-model fallback classifier, used for side-by-side comparison only.

use async_trait::async_trait;

use crate::models::ToolPrediction;
use crate::LorekeepError;

/// An external classifier (typically an LLM call) with the same output shape
/// as the local one. Its answers are recorded, never served.
#[async_trait]
pub trait FallbackClassifier: Send + Sync {
    /// Backend identifier stored on comparison records.
    fn name(&self) -> &str;

    async fn classify(&self, text: &str) -> Result<Vec<ToolPrediction>, LorekeepError>;
}

/// Fallback that is never configured.
pub struct NoopFallbackClassifier;

#[async_trait]
impl FallbackClassifier for NoopFallbackClassifier {
    fn name(&self) -> &str {
        "noop"
    }

    async fn classify(&self, _text: &str) -> Result<Vec<ToolPrediction>, LorekeepError> {
        Err(LorekeepError::ClassifierUnavailable(
            "No fallback classifier configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_fallback_reports_unavailable() {
        let fallback = NoopFallbackClassifier;
        assert_eq!(fallback.name(), "noop");
        assert!(fallback
            .classify("What is my AC?")
            .await
            .unwrap_err()
            .is_classifier_unavailable());
    }
}
