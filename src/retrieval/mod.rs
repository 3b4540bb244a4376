//! Per-source retrieval: category pre-filter, similarity search, parents.

pub mod index;
pub mod store;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::config::{HnswConfig, IntentTable, SearchStrategy};
use crate::models::{Entity, ParentSection, RetrievalCandidate, Source};
use crate::ranking::entity_match_fraction;
use crate::LorekeepError;

pub use index::{ExhaustiveIndex, HnswIndex, IndexPoint, VectorIndex};
pub use store::{CharacterSheet, CorpusFile, CorpusStore, KnowledgeStore};

/// What every retriever sees for one query.
#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    /// Resolved query text with real names restored.
    pub text: String,
    /// `None` when no embedding model is available.
    pub embedding: Option<Vec<f32>>,
    pub entities: Vec<Entity>,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    fn source(&self) -> Source;

    /// Top-`k` candidates for `intent`, ordered by raw score.
    ///
    /// An unknown intent or an empty eligible set yields `Ok(vec![])`.
    async fn retrieve(
        &self,
        query: &RetrievalQuery,
        intent: &str,
        k: usize,
    ) -> Result<Vec<RetrievalCandidate>, LorekeepError>;
}

/// Retriever over one [`KnowledgeStore`].
pub struct SourceRetriever {
    store: Arc<dyn KnowledgeStore>,
    index: Arc<dyn VectorIndex>,
    strategy: SearchStrategy,
    intents: Arc<IntentTable>,
}

impl SourceRetriever {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        strategy: SearchStrategy,
        intents: Arc<IntentTable>,
        hnsw: &HnswConfig,
    ) -> Self {
        let index: Arc<dyn VectorIndex> = match strategy {
            SearchStrategy::Approximate => Arc::new(HnswIndex::new(store.source().as_str(), hnsw)),
            SearchStrategy::FieldLookup | SearchStrategy::Exhaustive => Arc::new(ExhaustiveIndex),
        };
        Self::with_index(store, strategy, intents, index)
    }

    pub fn with_index(
        store: Arc<dyn KnowledgeStore>,
        strategy: SearchStrategy,
        intents: Arc<IntentTable>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            store,
            index,
            strategy,
            intents,
        }
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    pub fn index_name(&self) -> &'static str {
        self.index.name()
    }

    async fn attach_parents(&self, candidates: &mut [RetrievalCandidate]) -> Result<(), LorekeepError> {
        let mut parents: HashMap<String, Option<ParentSection>> = HashMap::new();
        for candidate in candidates.iter_mut() {
            let Some(parent_id) = candidate.parent_id.clone() else {
                continue;
            };
            if !parents.contains_key(&parent_id) {
                let parent = self.store.get_item(&parent_id).await?;
                if parent.is_none() {
                    warn!(source = %self.source(), parent_id = %parent_id, "Parent section missing from store");
                }
                parents.insert(parent_id.clone(), parent.as_ref().map(ParentSection::from_item));
            }
            candidate.parent = parents.get(&parent_id).cloned().flatten();
        }
        Ok(())
    }
}

#[async_trait]
impl Retriever for SourceRetriever {
    fn source(&self) -> Source {
        self.store.source()
    }

    async fn retrieve(
        &self,
        query: &RetrievalQuery,
        intent: &str,
        k: usize,
    ) -> Result<Vec<RetrievalCandidate>, LorekeepError> {
        let source = self.source();
        let categories = self.intents.categories(source, intent);
        if categories.is_empty() {
            debug!(source = %source, intent, "Intent has no categories");
            return Ok(Vec::new());
        }

        let mut eligible = self.store.get_items_by_category(categories).await?;
        if self.strategy == SearchStrategy::FieldLookup {
            let sections: HashSet<String> =
                eligible.iter().filter_map(|i| i.parent_id.clone()).collect();
            eligible.retain(|item| !sections.contains(&item.id));
        }
        if eligible.is_empty() || k == 0 {
            debug!(source = %source, intent, "No eligible items");
            return Ok(Vec::new());
        }

        let mut candidates: Vec<RetrievalCandidate> = match &query.embedding {
            Some(query_vector) => {
                let vectors =
                    try_join_all(eligible.iter().map(|item| self.store.get_embedding(&item.id)))
                        .await?;
                let points: Vec<IndexPoint> = eligible
                    .iter()
                    .zip(vectors)
                    .map(|(item, vector)| IndexPoint {
                        id: item.id.clone(),
                        vector,
                    })
                    .collect();
                self.index
                    .search(query_vector, &points, k)
                    .await?
                    .into_iter()
                    .map(|(idx, score)| {
                        let mut candidate =
                            RetrievalCandidate::from_item(source, &eligible[idx], score);
                        candidate.embedding = Some(points[idx].vector.clone());
                        candidate
                    })
                    .collect()
            }
            None => {
                // No model: order by entity mentions, then id.
                let mut scored: Vec<(usize, f32)> = eligible
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        (idx, entity_match_fraction(&query.entities, &item.title, &item.body))
                    })
                    .collect();
                scored.sort_by(|(ia, sa), (ib, sb)| {
                    sb.total_cmp(sa)
                        .then_with(|| eligible[*ia].id.cmp(&eligible[*ib].id))
                });
                scored
                    .into_iter()
                    .take(k)
                    .map(|(idx, _)| RetrievalCandidate::from_item(source, &eligible[idx], 0.0))
                    .collect()
            }
        };

        self.attach_parents(&mut candidates).await?;
        debug!(
            source = %source,
            intent,
            eligible = eligible.len(),
            returned = candidates.len(),
            index = self.index.name(),
            "Retrieved candidates"
        );
        Ok(candidates)
    }
}
