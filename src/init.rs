//! Process-wide component lifecycle.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::classifier::{CandleClassifierArtifact, FallbackClassifier, QueryClassifier};
use crate::config::{load_config, FeedbackStoreKind, RouterConfig};
use crate::db::connection::{init_db, load_db_config, LorekeepDb};
use crate::db::schema::apply_schema;
use crate::embedding::{
    CachedEmbeddingService, EmbeddingService, LocalEmbeddingService, NoopEmbeddingService,
};
use crate::feedback::{FeedbackLogger, FeedbackStore, MemoryFeedbackStore, SurrealFeedbackStore};
use crate::gazetteer::{EntityResolver, Gazetteer};
use crate::models::{Source, Turn};
use crate::pipeline::{Pipeline, PipelineParts};
use crate::resolver::{QueryResolver, RuleBasedRewriter};
use crate::retrieval::{CorpusStore, Retriever, SourceRetriever};

/// Long-lived components, built once by [`AppContext::init`].
pub struct AppContext {
    pub data_path: PathBuf,
    pub config: Arc<RouterConfig>,
    pub db: Option<Arc<LorekeepDb>>,
    pub embedding_service: Arc<dyn EmbeddingService>,
    pub pipeline: Arc<Pipeline>,
}

/// Data path priority: explicit path > LOREKEEP_DATA_PATH env > ./.lorekeep (if exists) > ~/.lorekeep
pub fn resolve_data_path(explicit_path: Option<PathBuf>) -> PathBuf {
    explicit_path
        .or_else(|| std::env::var("LOREKEEP_DATA_PATH").ok().map(PathBuf::from))
        .or_else(|| {
            let local_path = Path::new(".lorekeep");
            if local_path.exists() && local_path.is_dir() {
                Some(local_path.to_path_buf())
            } else {
                None
            }
        })
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".lorekeep"))
                .unwrap_or_else(|| PathBuf::from(".lorekeep"))
        })
}

impl AppContext {
    pub async fn init(explicit_path: Option<PathBuf>) -> Result<Self> {
        Self::init_with_fallback(explicit_path, None).await
    }

    /// Build every component. `fallback` is the large-model classifier used
    /// for comparison records, if one is wired in.
    pub async fn init_with_fallback(
        explicit_path: Option<PathBuf>,
        fallback: Option<Arc<dyn FallbackClassifier>>,
    ) -> Result<Self> {
        let data_path = resolve_data_path(explicit_path);
        std::fs::create_dir_all(&data_path)
            .with_context(|| format!("Failed to create {}", data_path.display()))?;
        tracing::info!("Using data path: {}", data_path.display());

        let config = Arc::new(load_config(&data_path));

        // Embedding model
        let embedding_service: Arc<dyn EmbeddingService> = if config.embedding.enabled {
            tracing::info!("Initializing embedding model...");
            let local = Arc::new(LocalEmbeddingService::load(&config.embedding.model).await);
            Arc::new(CachedEmbeddingService::new(local, config.embedding.cache_capacity))
        } else {
            Arc::new(NoopEmbeddingService::new())
        };
        if embedding_service.is_available() {
            tracing::info!(
                "Embedding model loaded ({} dimensions)",
                embedding_service.dimensions()
            );
        } else {
            tracing::warn!("Embedding model not available, ranking on entity matches only");
        }

        // Gazetteer
        let gazetteer = match &config.gazetteer.path {
            Some(path) => Gazetteer::load(&config.corpus_path(&data_path, path))?,
            None => Gazetteer::builtin(),
        };
        let entities = Arc::new(EntityResolver::new(&gazetteer, &config.gazetteer));

        // Classifier artifact
        let classifier = Arc::new(load_classifier(&config, &data_path).await);

        let resolver = Arc::new(QueryResolver::new(
            Arc::new(RuleBasedRewriter::new(entities.clone())),
            &config.resolver,
        ));

        // Knowledge stores
        let intents = Arc::new(config.intents.clone());
        let mut retrievers: Vec<Arc<dyn Retriever>> = Vec::new();
        for source in Source::all() {
            let relative = match source {
                Source::CharacterData => &config.corpus.character_sheet,
                Source::SessionNotes => &config.corpus.session_notes,
                Source::Rulebook => &config.corpus.rulebook,
            };
            let store = CorpusStore::load(
                source,
                &config.corpus_path(&data_path, relative),
                embedding_service.clone(),
            )?;
            if let Err(e) = store.precompute_embeddings().await {
                tracing::warn!(source = %source, "Failed to precompute embeddings: {}", e);
            }
            let retrieval = config.retrieval.for_source(source);
            retrievers.push(Arc::new(SourceRetriever::new(
                Arc::new(store),
                retrieval.strategy,
                intents.clone(),
                &config.retrieval.hnsw,
            )));
        }

        // Feedback log
        let (db, feedback_store): (Option<Arc<LorekeepDb>>, Arc<dyn FeedbackStore>) =
            match config.feedback.store {
                FeedbackStoreKind::Memory => (None, Arc::new(MemoryFeedbackStore::new())),
                FeedbackStoreKind::Surreal => {
                    let db_config = load_db_config(&data_path);
                    let db = init_db(&db_config, &data_path).await?;
                    tracing::info!("Database connected");
                    apply_schema(&db).await?;
                    tracing::info!("Schema applied");
                    let db = Arc::new(db);
                    (Some(db.clone()), Arc::new(SurrealFeedbackStore::new(db)))
                }
            };
        if config.feedback.comparison && fallback.is_none() {
            tracing::warn!("Comparison logging enabled but no fallback classifier is wired in");
        }
        let feedback = Arc::new(FeedbackLogger::new(feedback_store, fallback, &config.feedback));

        let pipeline = Arc::new(Pipeline::new(
            config.clone(),
            PipelineParts {
                entities,
                classifier,
                resolver,
                embedder: embedding_service.clone(),
                retrievers,
                feedback,
            },
        ));

        Ok(Self {
            data_path,
            config,
            db,
            embedding_service,
            pipeline,
        })
    }

    /// Conversation history from `{data_path}/history.json`, oldest first.
    /// Missing file means no history.
    pub fn load_history(&self) -> Result<Vec<Turn>> {
        let path = self
            .config
            .corpus_path(&self.data_path, &self.config.corpus.history);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Release components in dependency order.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.pipeline);
        if let Some(db) = self.db {
            if Arc::strong_count(&db) > 1 {
                tracing::warn!("Database handle still shared at shutdown");
            }
            drop(db);
        }
        tracing::info!("Shut down");
        Ok(())
    }
}

async fn load_classifier(config: &RouterConfig, data_path: &Path) -> QueryClassifier {
    let Some(dir) = &config.classifier.artifact_dir else {
        tracing::warn!("No classifier artifact configured");
        return QueryClassifier::unavailable("No classifier artifact configured", &config.classifier);
    };
    let dir = config.corpus_path(data_path, dir);
    let loaded = tokio::task::spawn_blocking(move || CandleClassifierArtifact::load(&dir)).await;
    match loaded {
        Ok(Ok(artifact)) => QueryClassifier::new(Arc::new(artifact), &config.classifier),
        Ok(Err(e)) => {
            tracing::warn!("{}", e);
            QueryClassifier::unavailable(e.to_string(), &config.classifier)
        }
        Err(e) => QueryClassifier::unavailable(
            format!("Classifier load task failed: {}", e),
            &config.classifier,
        ),
    }
}
