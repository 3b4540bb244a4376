//! SurrealDB-backed feedback store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::db::connection::LorekeepDb;
use crate::feedback::FeedbackStore;
use crate::models::{ComparisonResult, FeedbackCorrection, FeedbackRecord, ToolPrediction};
use crate::LorekeepError;

/// Stored shape of a [`FeedbackRecord`]. `key` carries the public id.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordRow {
    key: String,
    query: String,
    predictions: Vec<ToolPrediction>,
    comparison: Option<ComparisonResult>,
    notes: Option<String>,
    created_at: String,
    created_ms: i64,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CorrectionRow {
    key: String,
    record_key: String,
    is_correct: bool,
    corrected_predictions: Option<Vec<ToolPrediction>>,
    notes: Option<String>,
    created_at: String,
    created_ms: i64,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, LorekeepError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LorekeepError::Database(format!("Bad timestamp '{}': {}", value, e)))
}

impl From<&FeedbackRecord> for RecordRow {
    fn from(record: &FeedbackRecord) -> Self {
        Self {
            key: record.id.clone(),
            query: record.query.clone(),
            predictions: record.predictions.clone(),
            comparison: record.comparison.clone(),
            notes: record.notes.clone(),
            created_at: record.created_at.to_rfc3339(),
            created_ms: record.created_at.timestamp_millis(),
        }
    }
}

impl TryFrom<RecordRow> for FeedbackRecord {
    type Error = LorekeepError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.key,
            query: row.query,
            predictions: row.predictions,
            comparison: row.comparison,
            notes: row.notes,
            created_at: parse_time(&row.created_at)?,
        })
    }
}

impl From<&FeedbackCorrection> for CorrectionRow {
    fn from(c: &FeedbackCorrection) -> Self {
        Self {
            key: c.id.clone(),
            record_key: c.record_id.clone(),
            is_correct: c.is_correct,
            corrected_predictions: c.corrected_predictions.clone(),
            notes: c.notes.clone(),
            created_at: c.created_at.to_rfc3339(),
            created_ms: c.created_at.timestamp_millis(),
        }
    }
}

impl TryFrom<CorrectionRow> for FeedbackCorrection {
    type Error = LorekeepError;

    fn try_from(row: CorrectionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.key,
            record_id: row.record_key,
            is_correct: row.is_correct,
            corrected_predictions: row.corrected_predictions,
            notes: row.notes,
            created_at: parse_time(&row.created_at)?,
        })
    }
}

const RECORD_FIELDS: &str = "key, query, predictions, comparison, notes, created_at, created_ms";
const CORRECTION_FIELDS: &str =
    "key, record_key, is_correct, corrected_predictions, notes, created_at, created_ms";

/// Feedback store over the `feedback_record` and `feedback_correction`
/// tables. Only `CREATE` and `SELECT` statements are ever issued.
pub struct SurrealFeedbackStore {
    db: Arc<LorekeepDb>,
}

impl SurrealFeedbackStore {
    /// Expects [`crate::db::schema::apply_schema`] to have run.
    pub fn new(db: Arc<LorekeepDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FeedbackStore for SurrealFeedbackStore {
    async fn append_record(&self, record: &FeedbackRecord) -> Result<(), LorekeepError> {
        self.db
            .query("CREATE feedback_record CONTENT $row")
            .bind(("row", RecordRow::from(record)))
            .await?
            .check()?;
        Ok(())
    }

    async fn append_correction(&self, correction: &FeedbackCorrection) -> Result<(), LorekeepError> {
        self.db
            .query("CREATE feedback_correction CONTENT $row")
            .bind(("row", CorrectionRow::from(correction)))
            .await?
            .check()?;
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<Option<FeedbackRecord>, LorekeepError> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {RECORD_FIELDS} FROM feedback_record WHERE key = $key LIMIT 1"
            ))
            .bind(("key", id.to_string()))
            .await?;
        let rows: Vec<RecordRow> = result.take(0)?;
        rows.into_iter().next().map(FeedbackRecord::try_from).transpose()
    }

    async fn corrections_for(&self, record_id: &str) -> Result<Vec<FeedbackCorrection>, LorekeepError> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {CORRECTION_FIELDS} FROM feedback_correction \
                 WHERE record_key = $record_key ORDER BY created_ms ASC"
            ))
            .bind(("record_key", record_id.to_string()))
            .await?;
        let rows: Vec<CorrectionRow> = result.take(0)?;
        rows.into_iter().map(FeedbackCorrection::try_from).collect()
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>, LorekeepError> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {RECORD_FIELDS} FROM feedback_record ORDER BY created_ms DESC LIMIT $limit"
            ))
            .bind(("limit", limit as i64))
            .await?;
        let rows: Vec<RecordRow> = result.take(0)?;
        rows.into_iter().map(FeedbackRecord::try_from).collect()
    }
}
