use thiserror::Error;

/// Custom error type for Lorekeep operations.
///
/// Only genuinely unexpected failures live here. Degraded-but-expected
/// conditions (resolver timeouts, empty sources, budget drops) are carried as
/// data on the pipeline result instead.
#[derive(Debug, Error)]
pub enum LorekeepError {
    /// Classifier artifact missing, unloadable, failing, or timed out.
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// Placeholder re-substitution did not reproduce the original query text.
    #[error(
        "Malformed entity mapping: '{normalized}' restores to '{restored}', expected '{original}'"
    )]
    MalformedEntityMapping {
        original: String,
        normalized: String,
        restored: String,
    },

    /// Embedding model unavailable or failed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A knowledge store or vector index could not be reached.
    #[error("Store error ({source_id}): {message}")]
    Store { source_id: String, message: String },

    /// Feedback persistence failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Requested record was not found.
    #[error("Not found: {entity_type} with id '{id}'")]
    NotFound { entity_type: String, id: String },

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration or data file could not be parsed.
    #[error("Config error: {0}")]
    Config(String),
}

impl LorekeepError {
    /// Whether this error is the explicit "needs external resolution" signal.
    pub fn is_classifier_unavailable(&self) -> bool {
        matches!(self, LorekeepError::ClassifierUnavailable(_))
    }
}

impl From<surrealdb::Error> for LorekeepError {
    fn from(err: surrealdb::Error) -> Self {
        LorekeepError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for LorekeepError {
    fn from(err: serde_json::Error) -> Self {
        LorekeepError::Config(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml_ng::Error> for LorekeepError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        LorekeepError::Config(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for LorekeepError {
    fn from(err: toml::de::Error) -> Self {
        LorekeepError::Config(format!("TOML error: {}", err))
    }
}

impl From<std::io::Error> for LorekeepError {
    fn from(err: std::io::Error) -> Self {
        LorekeepError::Config(format!("I/O error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_unavailable_is_distinguishable() {
        let err = LorekeepError::ClassifierUnavailable("artifact missing".into());
        assert!(err.is_classifier_unavailable());
        assert!(!LorekeepError::Validation("x".into()).is_classifier_unavailable());
    }

    #[test]
    fn test_malformed_mapping_message_names_all_three_texts() {
        let err = LorekeepError::MalformedEntityMapping {
            original: "What level is Duskryn?".into(),
            normalized: "What level is {CHARACTER}?".into(),
            restored: "What level is Dusk?".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("{CHARACTER}"));
        assert!(msg.contains("Duskryn"));
        assert!(msg.contains("Dusk?"));
    }
}
