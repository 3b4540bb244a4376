pub mod candidate;
pub mod entity;
pub mod feedback;
pub mod prediction;
pub mod query;

pub use candidate::{
    estimate_tokens, ContextEntry, Inclusion, Item, ParentSection, RankedContext,
    RetrievalCandidate, ScoreBreakdown,
};
pub use entity::{Entity, EntityType};
pub use feedback::{predictions_agree, ComparisonResult, FeedbackCorrection, FeedbackRecord};
pub use prediction::{dedup_by_source, Source, ToolPrediction};
pub use query::{KnownNames, NormalizedQuery, SessionContext, Turn};
