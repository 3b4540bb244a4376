//! Append-only feedback records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::models::prediction::ToolPrediction;

/// Output of the fallback large-model classifier, recorded for comparison only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Backend identifier (e.g. model name).
    pub backend: String,
    pub predictions: Vec<ToolPrediction>,
    /// Whether both classifiers selected the same (source, intent) set.
    pub agrees: bool,
}

/// A routing decision as served. Never edited after creation.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: String,
    pub query: String,
    pub predictions: Vec<ToolPrediction>,
    pub comparison: Option<ComparisonResult>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(query: impl Into<String>, predictions: Vec<ToolPrediction>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.into(),
            predictions,
            comparison: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_comparison(mut self, comparison: Option<ComparisonResult>) -> Self {
        self.comparison = comparison;
        self
    }
}

/// A later judgement on a record, linked by id.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackCorrection {
    pub id: String,
    pub record_id: String,
    pub is_correct: bool,
    pub corrected_predictions: Option<Vec<ToolPrediction>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FeedbackCorrection {
    pub fn new(
        record_id: impl Into<String>,
        is_correct: bool,
        corrected_predictions: Option<Vec<ToolPrediction>>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            record_id: record_id.into(),
            is_correct,
            corrected_predictions,
            notes,
            created_at: Utc::now(),
        }
    }
}

/// Whether two prediction sets select the same (source, intent) pairs.
pub fn predictions_agree(a: &[ToolPrediction], b: &[ToolPrediction]) -> bool {
    let key = |p: &ToolPrediction| (p.source, p.intent.clone());
    let mut left: Vec<_> = a.iter().map(key).collect();
    let mut right: Vec<_> = b.iter().map(key).collect();
    left.sort();
    right.sort();
    left == right
}
