//! End-to-end routing: resolve, classify, retrieve, rank, assemble, log.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn, Span};

use crate::assembly::{Budget, ContextAssembler};
use crate::classifier::QueryClassifier;
use crate::config::RouterConfig;
use crate::embedding::EmbeddingService;
use crate::feedback::{FeedbackEntry, FeedbackLogger};
use crate::gazetteer::{restore_placeholders, EntityResolver};
use crate::models::{
    ComparisonResult, Entity, FeedbackCorrection, NormalizedQuery, RankedContext,
    RetrievalCandidate, ScoreBreakdown, SessionContext, Source, ToolPrediction, Turn,
};
use crate::ranking::{compare_ranked, ContextHints, ResultRanker};
use crate::resolver::{QueryResolver, ResolutionOutcome};
use crate::retrieval::{RetrievalQuery, Retriever};
use crate::LorekeepError;

/// Everything the caller needs to explain and correct a routing decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingMetadata {
    pub predictions: Vec<ToolPrediction>,
    pub classifier_version: Option<String>,
    /// Routed to every source because the classifier was unavailable.
    pub classifier_fallback: bool,
    pub entities: Vec<Entity>,
    /// Text the classifier saw.
    pub normalized_text: String,
    pub placeholders: BTreeMap<String, String>,
    pub resolution: ResolutionOutcome,
    /// Predicted sources that produced no candidates.
    pub empty_sources: Vec<Source>,
    /// Predicted sources whose retrieval exceeded the deadline.
    pub timed_out_sources: Vec<Source>,
    /// Every ranked candidate, in global order, before budgeting.
    pub scores: Vec<ScoreBreakdown>,
    pub dropped: usize,
    pub comparison: Option<ComparisonResult>,
    /// Feedback record id, when logging is on.
    pub record_id: Option<String>,
}

/// Long-lived components the pipeline is assembled from.
pub struct PipelineParts {
    pub entities: Arc<EntityResolver>,
    pub classifier: Arc<QueryClassifier>,
    pub resolver: Arc<QueryResolver>,
    pub embedder: Arc<dyn EmbeddingService>,
    pub retrievers: Vec<Arc<dyn Retriever>>,
    pub feedback: Arc<FeedbackLogger>,
}

pub struct Pipeline {
    config: Arc<RouterConfig>,
    entities: Arc<EntityResolver>,
    classifier: Arc<QueryClassifier>,
    resolver: Arc<QueryResolver>,
    embedder: Arc<dyn EmbeddingService>,
    retrievers: BTreeMap<Source, Arc<dyn Retriever>>,
    ranker: ResultRanker,
    assembler: ContextAssembler,
    feedback: Arc<FeedbackLogger>,
}

/// Classifier output after the unavailable-policy is applied.
struct Routing {
    normalized: NormalizedQuery,
    predictions: Vec<ToolPrediction>,
    fallback: bool,
}

/// Per-source retrieval results.
#[derive(Default)]
struct Retrieved {
    candidates: BTreeMap<Source, Vec<RetrievalCandidate>>,
    timed_out: Vec<Source>,
}

impl Pipeline {
    pub fn new(config: Arc<RouterConfig>, parts: PipelineParts) -> Self {
        let retrievers = parts
            .retrievers
            .into_iter()
            .map(|r| (r.source(), r))
            .collect();
        Self {
            ranker: ResultRanker::new(&config.ranking),
            assembler: ContextAssembler::new(),
            config,
            entities: parts.entities,
            classifier: parts.classifier,
            resolver: parts.resolver,
            embedder: parts.embedder,
            retrievers,
            feedback: parts.feedback,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn entity_resolver(&self) -> &EntityResolver {
        &self.entities
    }

    pub fn classifier(&self) -> &QueryClassifier {
        &self.classifier
    }

    pub fn default_budget(&self) -> Budget {
        Budget::from(&self.config.budget)
    }

    /// Route a query and assemble context under the configured budget.
    pub async fn route_and_retrieve(
        &self,
        query: &str,
        session: &SessionContext,
    ) -> Result<(RankedContext, RoutingMetadata), LorekeepError> {
        self.route_with_budget(query, session, self.default_budget())
            .await
    }

    /// Route a query and assemble context under `budget`.
    ///
    /// Dropping the returned future cancels every in-flight retrieval and
    /// skips feedback logging.
    #[instrument(
        name = "route_and_retrieve",
        skip_all,
        fields(resolution_applied = tracing::field::Empty)
    )]
    pub async fn route_with_budget(
        &self,
        query: &str,
        session: &SessionContext,
        budget: Budget,
    ) -> Result<(RankedContext, RoutingMetadata), LorekeepError> {
        debug!(query, "Routing query");
        let mut routing = self.route(query, session).await?;

        let resolution = if self.resolver.needs_resolution(query) {
            let outcome = self
                .resolver
                .resolve(query, &session.history, &session.known)
                .await;
            if let ResolutionOutcome::Rewritten { text } = &outcome {
                debug!(rewritten = %text, "Re-routing resolved query");
                routing = self.route(text, session).await?;
            }
            outcome
        } else {
            ResolutionOutcome::NotNeeded
        };
        Span::current().record(
            "resolution_applied",
            matches!(resolution, ResolutionOutcome::Rewritten { .. }),
        );

        let retrieval_text =
            restore_placeholders(&routing.normalized.text, &routing.normalized.placeholders);
        let retrieval_query = Arc::new(RetrievalQuery {
            embedding: self.embed_query(&retrieval_text).await?,
            text: retrieval_text,
            entities: routing.normalized.entities.clone(),
        });
        let hints = self.context_hints(&session.history).await?;

        let (retrieved, comparison) = tokio::join!(
            self.retrieve_all(&routing.predictions, retrieval_query.clone()),
            self.feedback
                .compare(&routing.normalized.text, &routing.predictions),
        );
        let retrieved = retrieved?;

        let mut ranked_by_source = BTreeMap::new();
        let mut empty_sources = Vec::new();
        for prediction in &routing.predictions {
            let candidates = retrieved
                .candidates
                .get(&prediction.source)
                .cloned()
                .unwrap_or_default();
            if candidates.is_empty() {
                if !retrieved.timed_out.contains(&prediction.source) {
                    empty_sources.push(prediction.source);
                }
                continue;
            }
            let ranked = self
                .ranker
                .rank(candidates, &retrieval_query.entities, &hints);
            ranked_by_source.insert(prediction.source, ranked);
        }

        let mut scores: Vec<&RetrievalCandidate> = ranked_by_source.values().flatten().collect();
        scores.sort_by(|a, b| compare_ranked(a, b));
        let scores: Vec<ScoreBreakdown> = scores.into_iter().map(|c| c.breakdown()).collect();

        let context = self.assembler.assemble(ranked_by_source, budget);

        let record_id = match self
            .feedback
            .log(query, &routing.predictions, comparison.clone())
            .await
        {
            Ok(record) => record.map(|r| r.id),
            Err(e) => {
                warn!("Failed to log routing decision: {}", e);
                None
            }
        };

        info!(
            sources = routing.predictions.len(),
            entries = context.entries.len(),
            dropped = context.dropped,
            "Routed query"
        );

        let metadata = RoutingMetadata {
            classifier_version: self.classifier.version().map(str::to_string),
            classifier_fallback: routing.fallback,
            entities: routing.normalized.entities,
            normalized_text: routing.normalized.text,
            placeholders: routing.normalized.placeholders,
            predictions: routing.predictions,
            resolution,
            empty_sources,
            timed_out_sources: retrieved.timed_out,
            scores,
            dropped: context.dropped,
            comparison,
            record_id,
        };
        Ok((context, metadata))
    }

    /// File a correction against a logged routing decision.
    pub async fn submit_feedback(
        &self,
        record_id: &str,
        is_correct: bool,
        corrected_predictions: Option<Vec<ToolPrediction>>,
        notes: Option<String>,
    ) -> Result<FeedbackCorrection, LorekeepError> {
        self.feedback
            .submit(record_id, is_correct, corrected_predictions, notes)
            .await
    }

    pub async fn feedback_history(&self, limit: usize) -> Result<Vec<FeedbackEntry>, LorekeepError> {
        self.feedback.history(limit).await
    }

    /// Entity resolution and classification for one text.
    async fn route(&self, text: &str, session: &SessionContext) -> Result<Routing, LorekeepError> {
        let normalized = self.entities.resolve(text, &session.known)?;
        match self.classifier.classify(&normalized.text).await {
            Ok(predictions) => Ok(Routing {
                normalized,
                predictions,
                fallback: false,
            }),
            Err(e)
                if e.is_classifier_unavailable()
                    && self.config.classifier.fallback_to_all_sources =>
            {
                warn!("{}; routing to every source", e);
                let predictions = Source::all()
                    .into_iter()
                    .filter_map(|source| {
                        self.config
                            .intents
                            .default_intent(source)
                            .map(|intent| ToolPrediction::new(source, intent, 0.0))
                    })
                    .collect();
                Ok(Routing {
                    normalized,
                    predictions,
                    fallback: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>, LorekeepError> {
        if !self.embedder.is_available() {
            return Ok(None);
        }
        Ok(Some(self.embedder.embed_text(text).await?))
    }

    async fn context_hints(&self, history: &[Turn]) -> Result<ContextHints, LorekeepError> {
        if self.ranker.context_weight() == 0.0 || history.is_empty() {
            return Ok(ContextHints::default());
        }
        let window = &history[history.len().saturating_sub(self.config.resolver.history_window)..];
        let text = window
            .iter()
            .map(|t| format!("{}\n{}", t.query, t.response))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ContextHints {
            embedding: self.embed_query(&text).await?,
        })
    }

    /// Query every predicted source concurrently.
    ///
    /// The first retriever error aborts the rest. A source that misses its
    /// deadline is reported, not failed.
    async fn retrieve_all(
        &self,
        predictions: &[ToolPrediction],
        query: Arc<RetrievalQuery>,
    ) -> Result<Retrieved, LorekeepError> {
        let timeout = Duration::from_millis(self.config.retrieval.timeout_ms);
        let mut tasks = JoinSet::new();

        for prediction in predictions {
            let Some(retriever) = self.retrievers.get(&prediction.source).cloned() else {
                warn!(source = %prediction.source, "No retriever registered for source");
                continue;
            };
            let k = self.config.retrieval.for_source(prediction.source).k;
            let intent = prediction.intent.clone();
            let query = query.clone();
            tasks.spawn(async move {
                let source = retriever.source();
                let result =
                    tokio::time::timeout(timeout, retriever.retrieve(&query, &intent, k)).await;
                (source, result)
            });
        }

        let mut retrieved = Retrieved::default();
        while let Some(joined) = tasks.join_next().await {
            let (source, result) = joined.map_err(|e| LorekeepError::Store {
                source_id: "retrieval".to_string(),
                message: format!("Retrieval task failed: {}", e),
            })?;
            match result {
                Ok(Ok(candidates)) => {
                    retrieved.candidates.insert(source, candidates);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        source = %source,
                        timeout_ms = timeout.as_millis() as u64,
                        "Retrieval timed out"
                    );
                    retrieved.timed_out.push(source);
                }
            }
        }
        retrieved.timed_out.sort();
        Ok(retrieved)
    }
}
