//! Similarity search over an eligible item set.
//!
//! Both strategies return `(point index, cosine score)` pairs ordered by
//! score descending, then point id ascending. The HNSW index only proposes
//! candidates; every returned score is the exact cosine, so the two
//! strategies agree on raw scores and differ only in recall.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use hnsw_rs::prelude::{DistL2, Hnsw};
use moka::future::Cache;
use tracing::debug;

use crate::config::HnswConfig;
use crate::utils::math::{cosine_similarity, vector_normalize};
use crate::LorekeepError;

/// An eligible item and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &'static str;

    /// Top-`k` points by cosine similarity to `query`.
    async fn search(
        &self,
        query: &[f32],
        points: &[IndexPoint],
        k: usize,
    ) -> Result<Vec<(usize, f32)>, LorekeepError>;
}

/// Score `indices` exactly and keep the best `k`.
fn rank_exact(
    query: &[f32],
    points: &[IndexPoint],
    indices: impl IntoIterator<Item = usize>,
    k: usize,
) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = indices
        .into_iter()
        .map(|i| (i, cosine_similarity(query, &points[i].vector)))
        .collect();
    scored.sort_by(|(ia, sa), (ib, sb)| {
        sb.total_cmp(sa)
            .then_with(|| points[*ia].id.cmp(&points[*ib].id))
    });
    scored.truncate(k);
    scored
}

/// Exact O(n) cosine scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExhaustiveIndex;

#[async_trait]
impl VectorIndex for ExhaustiveIndex {
    fn name(&self) -> &'static str {
        "exhaustive"
    }

    async fn search(
        &self,
        query: &[f32],
        points: &[IndexPoint],
        k: usize,
    ) -> Result<Vec<(usize, f32)>, LorekeepError> {
        Ok(rank_exact(query, points, 0..points.len(), k))
    }
}

/// HNSW graph over one eligible set. Vectors are unit-normalized so L2
/// order matches cosine order.
struct AnnGraph {
    hnsw: Hnsw<'static, f32, DistL2>,
}

impl AnnGraph {
    fn build(points: &[IndexPoint], config: &HnswConfig) -> Self {
        let nb_elem = points.len();
        let max_layer = 16usize.min((nb_elem as f32).ln().trunc() as usize).max(1);
        let hnsw = Hnsw::<f32, DistL2>::new(
            config.max_connections,
            nb_elem,
            max_layer,
            config.ef_construction,
            DistL2 {},
        );
        for (i, point) in points.iter().enumerate() {
            let normalized = vector_normalize(&point.vector);
            hnsw.insert((&normalized[..], i));
        }
        Self { hnsw }
    }

    fn neighbours(&self, query: &[f32], count: usize, ef_search: usize) -> Vec<usize> {
        let normalized = vector_normalize(query);
        self.hnsw
            .search(&normalized, count, ef_search.max(count))
            .into_iter()
            .map(|n| n.d_id)
            .collect()
    }
}

/// Approximate nearest neighbours with per-eligible-set graph caching.
///
/// Graphs are keyed by the ids of the eligible set, so each intent's
/// category filter builds its graph once. Stores are read-only, so a key
/// never goes stale.
pub struct HnswIndex {
    label: String,
    config: HnswConfig,
    graphs: Cache<u64, Arc<AnnGraph>>,
}

impl HnswIndex {
    pub fn new(label: impl Into<String>, config: &HnswConfig) -> Self {
        Self {
            label: label.into(),
            config: config.clone(),
            graphs: Cache::builder().max_capacity(config.cache_capacity).build(),
        }
    }

    fn key(points: &[IndexPoint]) -> u64 {
        let mut hasher = DefaultHasher::new();
        points.len().hash(&mut hasher);
        for point in points {
            point.id.hash(&mut hasher);
            point.vector.len().hash(&mut hasher);
        }
        hasher.finish()
    }

    async fn graph(&self, points: &[IndexPoint]) -> Result<Arc<AnnGraph>, LorekeepError> {
        let key = Self::key(points);
        if let Some(graph) = self.graphs.get(&key).await {
            return Ok(graph);
        }

        let owned = points.to_vec();
        let config = self.config.clone();
        let graph = tokio::task::spawn_blocking(move || AnnGraph::build(&owned, &config))
            .await
            .map_err(|e| LorekeepError::Store {
                source_id: self.label.clone(),
                message: format!("HNSW build failed: {}", e),
            })?;
        debug!(index = %self.label, points = points.len(), "Built HNSW graph");

        let graph = Arc::new(graph);
        self.graphs.insert(key, graph.clone()).await;
        Ok(graph)
    }

    pub fn cached_graphs(&self) -> u64 {
        self.graphs.entry_count()
    }
}

#[async_trait]
impl VectorIndex for HnswIndex {
    fn name(&self) -> &'static str {
        "hnsw"
    }

    async fn search(
        &self,
        query: &[f32],
        points: &[IndexPoint],
        k: usize,
    ) -> Result<Vec<(usize, f32)>, LorekeepError> {
        let fetch = k.saturating_mul(self.config.over_fetch.max(1));
        if points.len() <= fetch {
            return Ok(rank_exact(query, points, 0..points.len(), k));
        }

        let graph = self.graph(points).await?;
        let q = query.to_vec();
        let ef_search = self.config.ef_search;
        let ids = tokio::task::spawn_blocking(move || graph.neighbours(&q, fetch, ef_search))
            .await
            .map_err(|e| LorekeepError::Store {
                source_id: self.label.clone(),
                message: format!("HNSW search failed: {}", e),
            })?;

        let unique: BTreeSet<usize> = ids.into_iter().filter(|&i| i < points.len()).collect();
        Ok(rank_exact(query, points, unique, k))
    }
}
