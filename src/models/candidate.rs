//! Knowledge items, retrieval candidates and the assembled context.

use serde::{Deserialize, Serialize};

use crate::models::prediction::Source;

/// A retrievable unit of knowledge (character field, session note, rulebook section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Category tags used for intent pre-filtering.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Parent section id when this item is a subsection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Precomputed embedding, if the corpus ships one.
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
}

impl Item {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            categories: Vec::new(),
            parent_id: None,
            embedding: None,
        }
    }

    pub fn with_categories(mut self, categories: &[&str]) -> Self {
        self.categories = categories.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Text used to embed the item.
    pub fn embedding_text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n{}", self.title, self.body)
        }
    }

    /// Whether any of the item's categories is in `allowed`.
    pub fn matches_any(&self, allowed: &[String]) -> bool {
        self.categories.iter().any(|c| allowed.contains(c))
    }
}

/// A scored retrieval hit. Lives only for the duration of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub source: Source,
    pub item_id: String,
    pub title: String,
    pub content: String,
    /// Raw cosine similarity from the retriever.
    pub semantic_score: f32,
    /// Fraction of query entities found verbatim in title or content.
    pub entity_boost: f32,
    /// Similarity to recent conversational context (0 unless configured).
    pub context_boost: f32,
    /// Deterministic fusion of the three component scores.
    pub fused_score: f32,
    pub parent_id: Option<String>,
    /// Parent section content, attached by the retriever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentSection>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// Structural context for a subsection hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentSection {
    pub item_id: String,
    pub title: String,
    pub content: String,
}

impl ParentSection {
    pub fn from_item(item: &Item) -> Self {
        Self {
            item_id: item.id.clone(),
            title: item.title.clone(),
            content: item.body.clone(),
        }
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.title) + estimate_tokens(&self.content)
    }
}

impl RetrievalCandidate {
    /// Build an unranked candidate from a store item and its raw similarity.
    pub fn from_item(source: Source, item: &Item, semantic_score: f32) -> Self {
        Self {
            source,
            item_id: item.id.clone(),
            title: item.title.clone(),
            content: item.body.clone(),
            semantic_score,
            entity_boost: 0.0,
            context_boost: 0.0,
            fused_score: 0.0,
            parent_id: item.parent_id.clone(),
            parent: None,
            embedding: None,
        }
    }

    /// Approximate token cost (~4 chars per token, title + content).
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.title) + estimate_tokens(&self.content)
    }

    pub fn breakdown(&self) -> ScoreBreakdown {
        ScoreBreakdown {
            source: self.source,
            item_id: self.item_id.clone(),
            semantic_score: self.semantic_score,
            entity_boost: self.entity_boost,
            context_boost: self.context_boost,
            fused_score: self.fused_score,
        }
    }
}

/// Token estimate used for budgeting: ~4 chars per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Per-candidate score components exposed in routing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub source: Source,
    pub item_id: String,
    pub semantic_score: f32,
    pub entity_boost: f32,
    pub context_boost: f32,
    pub fused_score: f32,
}

/// Why an entry is in the assembled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inclusion {
    /// Ranked match.
    Matched,
    /// Parent section pulled in by a matched subsection.
    Parent,
}

/// One entry of the assembled context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub source: Source,
    pub item_id: String,
    pub title: String,
    pub content: String,
    pub fused_score: f32,
    pub inclusion: Inclusion,
    pub estimated_tokens: usize,
}

/// The pipeline's terminal artifact: ranked, bounded context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedContext {
    /// Entries in global fused-score order (parents precede their children).
    pub entries: Vec<ContextEntry>,
    pub estimated_tokens: usize,
    /// Candidates skipped because they did not fit the budget.
    pub dropped: usize,
}

impl RankedContext {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of matched (non-parent) entries.
    pub fn matched_len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.inclusion == Inclusion::Matched)
            .count()
    }

    /// Sources present in the context, canonical order.
    pub fn sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.entries.iter().map(|e| e.source).collect();
        sources.sort();
        sources.dedup();
        sources
    }

    /// Entries grouped by source; within a group the global order is kept.
    pub fn by_source(&self) -> Vec<(Source, Vec<&ContextEntry>)> {
        self.sources()
            .into_iter()
            .map(|source| {
                let group = self.entries.iter().filter(|e| e.source == source).collect();
                (source, group)
            })
            .collect()
    }
}
