//! Score fusion shared by every retrieval backend.
//!
//! `fused = semantic * 0.75 + entity_boost * 0.25 + context_boost`
//!
//! The weights are fixed so that rankings stay comparable when the embedding
//! model or index underneath changes. `context_boost` is
//! `context_weight * max(0, cos(candidate, context))` and is zero unless a
//! weight is configured.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::config::RankingConfig;
use crate::models::{Entity, RetrievalCandidate};
use crate::utils::math::cosine_similarity;

pub const SEMANTIC_WEIGHT: f32 = 0.75;
pub const ENTITY_WEIGHT: f32 = 0.25;

/// Extra signals available at ranking time.
#[derive(Debug, Clone, Default)]
pub struct ContextHints {
    /// Embedding of recent conversation, when context weighting is on.
    pub embedding: Option<Vec<f32>>,
}

pub fn fuse(semantic: f32, entity_boost: f32, context_boost: f32) -> f32 {
    semantic * SEMANTIC_WEIGHT + entity_boost * ENTITY_WEIGHT + context_boost
}

/// Fraction of distinct query entities mentioned in `title` or `content`.
///
/// An entity counts when its canonical name or its surface text occurs,
/// ignoring case. Zero when there are no entities.
pub fn entity_match_fraction(entities: &[Entity], title: &str, content: &str) -> f32 {
    let distinct: BTreeSet<String> = entities
        .iter()
        .map(|e| e.canonical().to_lowercase())
        .collect();
    if distinct.is_empty() {
        return 0.0;
    }
    let haystack = format!("{}\n{}", title, content).to_lowercase();
    let found = distinct
        .iter()
        .filter(|canonical| {
            haystack.contains(canonical.as_str())
                || entities.iter().any(|e| {
                    e.canonical().to_lowercase() == **canonical
                        && haystack.contains(&e.text.to_lowercase())
                })
        })
        .count();
    found as f32 / distinct.len() as f32
}

/// Total order used everywhere ranked candidates are sorted: fused score
/// descending, then raw semantic score descending, then item id and source.
pub fn compare_ranked(a: &RetrievalCandidate, b: &RetrievalCandidate) -> Ordering {
    b.fused_score
        .total_cmp(&a.fused_score)
        .then_with(|| b.semantic_score.total_cmp(&a.semantic_score))
        .then_with(|| a.item_id.cmp(&b.item_id))
        .then_with(|| a.source.cmp(&b.source))
}

/// Populates boosts and fused scores, then sorts.
#[derive(Debug, Clone, Default)]
pub struct ResultRanker {
    context_weight: f32,
}

impl ResultRanker {
    pub fn new(config: &RankingConfig) -> Self {
        Self {
            context_weight: config.context_weight,
        }
    }

    pub fn context_weight(&self) -> f32 {
        self.context_weight
    }

    pub fn rank(
        &self,
        mut candidates: Vec<RetrievalCandidate>,
        entities: &[Entity],
        hints: &ContextHints,
    ) -> Vec<RetrievalCandidate> {
        for candidate in &mut candidates {
            candidate.entity_boost =
                entity_match_fraction(entities, &candidate.title, &candidate.content);
            candidate.context_boost = self.context_boost(candidate, hints);
            candidate.fused_score = fuse(
                candidate.semantic_score,
                candidate.entity_boost,
                candidate.context_boost,
            );
        }
        candidates.sort_by(compare_ranked);
        candidates
    }

    fn context_boost(&self, candidate: &RetrievalCandidate, hints: &ContextHints) -> f32 {
        if self.context_weight == 0.0 {
            return 0.0;
        }
        match (&candidate.embedding, &hints.embedding) {
            (Some(item), Some(context)) => {
                self.context_weight * cosine_similarity(item, context).max(0.0)
            }
            _ => 0.0,
        }
    }
}
