//! Two-stage gated query classifier.
//!
//! Stage 1 scores every source independently (calibrated sigmoid against a
//! threshold). Stage 2 picks one intent per selected source. An intent head
//! is never evaluated for a source that stage 1 dropped.

pub mod calibration;
pub mod candle_model;
pub mod fallback;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ClassifierConfig;
use crate::models::{Source, ToolPrediction};
use crate::LorekeepError;

pub use candle_model::CandleClassifierArtifact;
pub use fallback::{FallbackClassifier, NoopFallbackClassifier};

/// Inference contract of a trained classifier artifact.
///
/// Implementations are read-only after load and are shared across
/// concurrent queries without locking.
pub trait ClassifierModel: Send + Sync {
    /// Artifact version string, recorded with predictions.
    fn version(&self) -> &str;

    /// Raw stage-1 logit per source.
    fn source_logits(&self, text: &str) -> Result<BTreeMap<Source, f32>, LorekeepError>;

    /// Raw stage-2 logit per intent label of `source`.
    fn intent_logits(&self, text: &str, source: Source)
        -> Result<BTreeMap<String, f32>, LorekeepError>;

    /// Calibration temperature fit offline.
    fn temperature(&self) -> f32;
}

/// Run both stages with gating. Pure function of (model, text, threshold).
///
/// Each prediction's confidence is the stage-1 probability times the stage-2
/// probability of the chosen intent. Output is unique by source, in
/// canonical source order.
pub fn gated_predict(
    model: &dyn ClassifierModel,
    text: &str,
    threshold: f32,
) -> Result<Vec<ToolPrediction>, LorekeepError> {
    let temperature = model.temperature();
    let source_logits = model.source_logits(text)?;

    let mut predictions = Vec::new();
    for source in Source::all() {
        let Some(&logit) = source_logits.get(&source) else {
            continue;
        };
        let p_source = calibration::calibrated_sigmoid(logit, temperature);
        if p_source < threshold {
            debug!(source = %source, p_source, "Source below threshold");
            continue;
        }
        let intent_logits = model.intent_logits(text, source)?;
        if let Some((intent, p_intent)) = calibration::calibrated_argmax(&intent_logits, temperature)
        {
            predictions.push(ToolPrediction::new(source, intent, p_source * p_intent));
        }
    }
    Ok(predictions)
}

/// Classifier front end: owns the loaded artifact (if any), the threshold and
/// the deadline.
pub struct QueryClassifier {
    model: Option<Arc<dyn ClassifierModel>>,
    unavailable_reason: String,
    threshold: f32,
    timeout: Duration,
}

impl QueryClassifier {
    pub fn new(model: Arc<dyn ClassifierModel>, config: &ClassifierConfig) -> Self {
        Self {
            model: Some(model),
            unavailable_reason: String::new(),
            threshold: config.source_threshold,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// A classifier whose artifact could not be loaded. Every call returns
    /// [`LorekeepError::ClassifierUnavailable`] with `reason`.
    pub fn unavailable(reason: impl Into<String>, config: &ClassifierConfig) -> Self {
        Self {
            model: None,
            unavailable_reason: reason.into(),
            threshold: config.source_threshold,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn version(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.version())
    }

    /// Classify normalized query text.
    ///
    /// An empty `Ok` means no source is needed. Missing artifacts, inference
    /// errors and timeouts all surface as `ClassifierUnavailable`.
    pub async fn classify(&self, normalized_text: &str) -> Result<Vec<ToolPrediction>, LorekeepError> {
        let model = self
            .model
            .clone()
            .ok_or_else(|| LorekeepError::ClassifierUnavailable(self.unavailable_reason.clone()))?;
        let text = normalized_text.to_string();
        let threshold = self.threshold;

        let task = tokio::task::spawn_blocking(move || gated_predict(model.as_ref(), &text, threshold));
        let predictions = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(predictions))) => predictions,
            Ok(Ok(Err(e))) => {
                warn!("Classifier inference failed: {}", e);
                return Err(match e {
                    LorekeepError::ClassifierUnavailable(_) => e,
                    other => LorekeepError::ClassifierUnavailable(other.to_string()),
                });
            }
            Ok(Err(join)) => {
                return Err(LorekeepError::ClassifierUnavailable(format!(
                    "Inference task failed: {}",
                    join
                )))
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Classifier timed out");
                return Err(LorekeepError::ClassifierUnavailable(format!(
                    "Timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        debug!(count = predictions.len(), "Classified query");
        Ok(predictions)
    }
}
