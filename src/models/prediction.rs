//! Knowledge sources and routing predictions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::LorekeepError;

/// One of the three knowledge domains a query can be routed to.
///
/// Declaration order is the canonical source order used for tie-breaking and
/// for grouping in assembled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    CharacterData,
    SessionNotes,
    Rulebook,
}

impl Source {
    /// Stable identifier used in artifacts, config and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::CharacterData => "character_data",
            Source::SessionNotes => "session_notes",
            Source::Rulebook => "rulebook",
        }
    }

    /// All sources in canonical order.
    pub fn all() -> [Source; 3] {
        [Source::CharacterData, Source::SessionNotes, Source::Rulebook]
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = LorekeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "character_data" | "character" => Ok(Source::CharacterData),
            "session_notes" | "session" | "notes" => Ok(Source::SessionNotes),
            "rulebook" | "rules" => Ok(Source::Rulebook),
            other => Err(LorekeepError::Validation(format!(
                "Unknown source '{}'. Expected one of: character_data, session_notes, rulebook",
                other
            ))),
        }
    }
}

/// A routing decision: query this source for this intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPrediction {
    pub source: Source,
    pub intent: String,
    /// Calibrated confidence in [0, 1] (stage-1 probability times stage-2 probability).
    pub confidence: f32,
}

impl ToolPrediction {
    pub fn new(source: Source, intent: impl Into<String>, confidence: f32) -> Self {
        Self {
            source,
            intent: intent.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Parse a `source:intent` correction spec (confidence 1.0).
    pub fn parse_spec(spec: &str) -> Result<Self, LorekeepError> {
        let (source, intent) = spec.split_once(':').ok_or_else(|| {
            LorekeepError::Validation(format!(
                "Invalid prediction '{}': expected 'source:intent'",
                spec
            ))
        })?;
        let intent = intent.trim();
        if intent.is_empty() {
            return Err(LorekeepError::Validation(format!(
                "Invalid prediction '{}': intent is empty",
                spec
            )));
        }
        Ok(Self::new(source.parse()?, intent, 1.0))
    }
}

/// Deduplicate predictions by source, keeping the highest-confidence entry
/// per source, returned in canonical source order.
pub fn dedup_by_source(predictions: Vec<ToolPrediction>) -> Vec<ToolPrediction> {
    let mut best: Vec<ToolPrediction> = Vec::with_capacity(predictions.len());
    for prediction in predictions {
        match best.iter_mut().find(|p| p.source == prediction.source) {
            Some(existing) if existing.confidence >= prediction.confidence => {}
            Some(existing) => *existing = prediction,
            None => best.push(prediction),
        }
    }
    best.sort_by_key(|p| p.source);
    best
}
