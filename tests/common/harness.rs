//! Test doubles and a fully wired in-memory pipeline.
//!
//! Nothing here loads model weights: embeddings are bags of words over a
//! fixed vocabulary and the classifier is a keyword table.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use lorekeep::classifier::{ClassifierModel, FallbackClassifier, QueryClassifier};
use lorekeep::config::{FeedbackStoreKind, IntentTable, RouterConfig};
use lorekeep::db::connection::{init_db, DbConfig, LorekeepDb};
use lorekeep::db::schema::apply_schema;
use lorekeep::embedding::EmbeddingService;
use lorekeep::feedback::{FeedbackLogger, FeedbackStore, MemoryFeedbackStore};
use lorekeep::gazetteer::{EntityResolver, Gazetteer};
use lorekeep::models::{Item, RetrievalCandidate, Source, ToolPrediction};
use lorekeep::resolver::{QueryResolver, RuleBasedRewriter};
use lorekeep::retrieval::{CorpusStore, RetrievalQuery, Retriever, SourceRetriever};
use lorekeep::{LorekeepError, Pipeline, PipelineParts};

use super::builders::{character_items, rulebook_items, session_items};

/// Words the test embedding knows. Anything else is ignored.
pub const VOCABULARY: &[&str] = &[
    "fireball", "magic", "missile", "shield", "spell", "spells", "fire", "damage", "force",
    "armor", "class", "ac", "hit", "points", "speed", "level", "wizard", "goblin", "goblins",
    "ambush", "hideout", "sildar", "grapple", "grappling", "attack", "rest", "short", "mage",
];

/// Deterministic bag-of-words embedding over [`VOCABULARY`]: one dimension
/// per word, counts normalized to unit length. Texts sharing vocabulary
/// words are similar; texts with none embed to the zero vector.
pub struct VocabEmbeddingService;

pub fn vocab_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; VOCABULARY.len()];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let lower = word.to_lowercase();
        if let Some(i) = VOCABULARY.iter().position(|w| *w == lower) {
            v[i] += 1.0;
        }
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[async_trait]
impl EmbeddingService for VocabEmbeddingService {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LorekeepError> {
        Ok(vocab_embed(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LorekeepError> {
        Ok(texts.iter().map(|t| vocab_embed(t)).collect())
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len()
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// A keyword that routes to one (source, intent).
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub keyword: &'static str,
    pub source: Source,
    pub intent: &'static str,
}

/// Keyword-table classifier artifact that records every stage-2 call.
///
/// Stage 1 emits logit +4 for a source with a matching rule and -4
/// otherwise; stage 2 emits +6 for the matched intent and 0 for the other
/// intents of the source.
pub struct ScriptedClassifier {
    rules: Vec<KeywordRule>,
    intents: IntentTable,
    intent_calls: Mutex<Vec<Source>>,
}

impl ScriptedClassifier {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self {
            rules,
            intents: IntentTable::default(),
            intent_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn intent_calls(&self) -> Vec<Source> {
        self.intent_calls.lock().unwrap().clone()
    }

    fn matching(&self, text: &str) -> Vec<&KeywordRule> {
        let lower = text.to_lowercase();
        self.rules
            .iter()
            .filter(|r| lower.contains(r.keyword))
            .collect()
    }
}

impl ClassifierModel for ScriptedClassifier {
    fn version(&self) -> &str {
        "scripted-1"
    }

    fn source_logits(&self, text: &str) -> Result<BTreeMap<Source, f32>, LorekeepError> {
        let matched = self.matching(text);
        Ok(Source::all()
            .into_iter()
            .map(|source| {
                let hit = matched.iter().any(|r| r.source == source);
                (source, if hit { 4.0 } else { -4.0 })
            })
            .collect())
    }

    fn intent_logits(
        &self,
        text: &str,
        source: Source,
    ) -> Result<BTreeMap<String, f32>, LorekeepError> {
        self.intent_calls.lock().unwrap().push(source);
        let wanted = self
            .matching(text)
            .into_iter()
            .find(|r| r.source == source)
            .map(|r| r.intent);
        Ok(self
            .intents
            .intents(source)
            .map(|intent| {
                let logit = if Some(intent) == wanted { 6.0 } else { 0.0 };
                (intent.to_string(), logit)
            })
            .collect())
    }

    fn temperature(&self) -> f32 {
        1.0
    }
}

/// The routing table used by the end-to-end scenarios.
pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule {
            keyword: " ac",
            source: Source::CharacterData,
            intent: "combat_info",
        },
        KeywordRule {
            keyword: "hit points",
            source: Source::CharacterData,
            intent: "combat_info",
        },
        KeywordRule {
            keyword: "level",
            source: Source::CharacterData,
            intent: "progress_info",
        },
        KeywordRule {
            keyword: "fireball",
            source: Source::Rulebook,
            intent: "spell_details",
        },
        KeywordRule {
            keyword: "magic missile",
            source: Source::Rulebook,
            intent: "spell_details",
        },
        KeywordRule {
            keyword: "poisoned",
            source: Source::Rulebook,
            intent: "condition_effects",
        },
        KeywordRule {
            keyword: "goblin",
            source: Source::SessionNotes,
            intent: "event_recap",
        },
    ]
}

/// Fallback classifier returning a fixed answer.
pub struct FixedFallback {
    pub predictions: Vec<ToolPrediction>,
}

#[async_trait]
impl FallbackClassifier for FixedFallback {
    fn name(&self) -> &str {
        "fixed-llm"
    }

    async fn classify(&self, _text: &str) -> Result<Vec<ToolPrediction>, LorekeepError> {
        Ok(self.predictions.clone())
    }
}

/// Retriever that sleeps before answering and counts how far it got.
pub struct SlowRetriever {
    pub source: Source,
    pub delay: Duration,
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
}

impl SlowRetriever {
    pub fn new(source: Source, delay: Duration) -> Self {
        Self {
            source,
            delay,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Retriever for SlowRetriever {
    fn source(&self) -> Source {
        self.source
    }

    async fn retrieve(
        &self,
        _query: &RetrievalQuery,
        _intent: &str,
        _k: usize,
    ) -> Result<Vec<RetrievalCandidate>, LorekeepError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

/// Corpus store over fixture items, embedded with [`VocabEmbeddingService`].
pub fn fixture_store(source: Source, items: Vec<Item>) -> Arc<CorpusStore> {
    Arc::new(
        CorpusStore::new(source, items, Arc::new(VocabEmbeddingService))
            .expect("fixture items have unique ids"),
    )
}

/// Options for [`TestRig::build`].
pub struct RigOptions {
    pub config: RouterConfig,
    pub classifier_available: bool,
    pub fallback: Option<Arc<dyn FallbackClassifier>>,
    /// Replaces the fixture retriever for its source.
    pub override_retriever: Option<Arc<dyn Retriever>>,
    pub feedback_store: Option<Arc<dyn FeedbackStore>>,
}

impl Default for RigOptions {
    fn default() -> Self {
        let mut config = RouterConfig::default();
        config.feedback.store = FeedbackStoreKind::Memory;
        Self {
            config,
            classifier_available: true,
            fallback: None,
            override_retriever: None,
            feedback_store: None,
        }
    }
}

/// A pipeline over fixture corpora plus handles to its test doubles.
pub struct TestRig {
    pub pipeline: Pipeline,
    pub classifier: Arc<ScriptedClassifier>,
    pub feedback_store: Arc<dyn FeedbackStore>,
}

impl TestRig {
    pub fn new() -> Self {
        Self::build(RigOptions::default())
    }

    pub fn build(options: RigOptions) -> Self {
        let config = Arc::new(options.config);
        let entities = Arc::new(EntityResolver::new(
            &Gazetteer::builtin(),
            &config.gazetteer,
        ));

        let scripted = Arc::new(ScriptedClassifier::new(default_rules()));
        let classifier = if options.classifier_available {
            QueryClassifier::new(scripted.clone(), &config.classifier)
        } else {
            QueryClassifier::unavailable("artifact missing", &config.classifier)
        };

        let resolver = QueryResolver::new(
            Arc::new(RuleBasedRewriter::new(entities.clone())),
            &config.resolver,
        );

        let intents = Arc::new(config.intents.clone());
        let fixtures = [
            (Source::CharacterData, character_items()),
            (Source::SessionNotes, session_items()),
            (Source::Rulebook, rulebook_items()),
        ];
        let mut retrievers: Vec<Arc<dyn Retriever>> = Vec::new();
        for (source, items) in fixtures {
            if let Some(custom) = &options.override_retriever {
                if custom.source() == source {
                    retrievers.push(custom.clone());
                    continue;
                }
            }
            retrievers.push(Arc::new(SourceRetriever::new(
                fixture_store(source, items),
                config.retrieval.for_source(source).strategy,
                intents.clone(),
                &config.retrieval.hnsw,
            )));
        }

        let feedback_store = options
            .feedback_store
            .unwrap_or_else(|| Arc::new(MemoryFeedbackStore::new()));
        let feedback = Arc::new(FeedbackLogger::new(
            feedback_store.clone(),
            options.fallback,
            &config.feedback,
        ));

        let pipeline = Pipeline::new(
            config,
            PipelineParts {
                entities,
                classifier: Arc::new(classifier),
                resolver: Arc::new(resolver),
                embedder: Arc::new(VocabEmbeddingService),
                retrievers,
                feedback,
            },
        );

        Self {
            pipeline,
            classifier: scripted,
            feedback_store,
        }
    }
}

/// Isolated embedded database with the feedback schema applied.
pub struct TestDb {
    pub db: Arc<LorekeepDb>,
    pub temp_dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory for test database");
        let config = DbConfig::Embedded {
            path: Some(temp_dir.path().join("test.db").to_string_lossy().into_owned()),
        };
        let db = init_db(&config, temp_dir.path())
            .await
            .expect("Failed to initialize test database");
        apply_schema(&db)
            .await
            .expect("Failed to apply schema to test database");
        Self {
            db: Arc::new(db),
            temp_dir,
        }
    }
}
