//! Budgeted context assembly.
//!
//! Candidates from every source are merged into one global order and taken
//! greedily. A candidate and its not-yet-included parent section form one
//! unit: the unit either fits whole or is skipped, and assembly continues
//! with the next candidate. Content is never truncated.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::config::BudgetConfig;
use crate::models::{ContextEntry, Inclusion, RankedContext, RetrievalCandidate, Source};
use crate::ranking::compare_ranked;

/// Item and token limits. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    pub max_items: Option<usize>,
    pub max_tokens: Option<usize>,
}

impl Budget {
    pub fn unbounded() -> Self {
        Self::default()
    }

    fn admits(&self, items: usize, tokens: usize) -> bool {
        self.max_items.map_or(true, |max| items <= max)
            && self.max_tokens.map_or(true, |max| tokens <= max)
    }
}

impl From<&BudgetConfig> for Budget {
    fn from(config: &BudgetConfig) -> Self {
        Self {
            max_items: config.max_items,
            max_tokens: config.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(
        &self,
        ranked_by_source: BTreeMap<Source, Vec<RetrievalCandidate>>,
        budget: Budget,
    ) -> RankedContext {
        let mut all: Vec<RetrievalCandidate> = ranked_by_source.into_values().flatten().collect();
        all.sort_by(compare_ranked);

        let mut context = RankedContext::default();
        let mut included: HashSet<(Source, String)> = HashSet::new();

        for candidate in all {
            if included.contains(&(candidate.source, candidate.item_id.clone())) {
                continue;
            }

            let mut unit: Vec<ContextEntry> = Vec::with_capacity(2);
            if let Some(parent) = &candidate.parent {
                if !included.contains(&(candidate.source, parent.item_id.clone())) {
                    unit.push(ContextEntry {
                        source: candidate.source,
                        item_id: parent.item_id.clone(),
                        title: parent.title.clone(),
                        content: parent.content.clone(),
                        fused_score: candidate.fused_score,
                        inclusion: Inclusion::Parent,
                        estimated_tokens: parent.estimated_tokens(),
                    });
                }
            }
            unit.push(ContextEntry {
                source: candidate.source,
                item_id: candidate.item_id.clone(),
                estimated_tokens: candidate.estimated_tokens(),
                title: candidate.title,
                content: candidate.content,
                fused_score: candidate.fused_score,
                inclusion: Inclusion::Matched,
            });

            let unit_tokens: usize = unit.iter().map(|e| e.estimated_tokens).sum();
            if !budget.admits(
                context.entries.len() + unit.len(),
                context.estimated_tokens + unit_tokens,
            ) {
                context.dropped += 1;
                continue;
            }

            for entry in unit {
                included.insert((entry.source, entry.item_id.clone()));
                context.entries.push(entry);
            }
            context.estimated_tokens += unit_tokens;
        }

        if context.dropped > 0 {
            debug!(
                dropped = context.dropped,
                kept = context.entries.len(),
                "Context budget dropped candidates"
            );
        }
        context
    }
}
