//! Runtime configuration.
//!
//! Loaded once at startup and shared read-only. Priority:
//! 1. `{data_path}/lorekeep.toml`
//! 2. `LOREKEEP_CONFIG` env var (JSON)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::Source;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub embedding: EmbeddingConfig,
    pub classifier: ClassifierConfig,
    pub resolver: ResolverConfig,
    pub gazetteer: GazetteerConfig,
    pub retrieval: RetrievalConfig,
    pub ranking: RankingConfig,
    pub budget: BudgetConfig,
    pub intents: IntentTable,
    pub feedback: FeedbackConfig,
    pub corpus: CorpusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// HuggingFace repo id of the sentence embedding model.
    pub model: String,
    /// Load the model at startup. When false, semantic scores are zero and
    /// ranking relies on entity matches.
    pub enabled: bool,
    /// Cached query embeddings.
    pub cache_capacity: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "BAAI/bge-small-en-v1.5".to_string(),
            enabled: true,
            cache_capacity: 1_024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Directory holding the trained classifier artifact.
    pub artifact_dir: Option<PathBuf>,
    /// Stage-1 calibrated probability threshold.
    pub source_threshold: f32,
    pub timeout_ms: u64,
    /// Route to every source when the classifier is unavailable instead of failing.
    pub fallback_to_all_sources: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            artifact_dir: None,
            source_threshold: 0.5,
            timeout_ms: 2_000,
            fallback_to_all_sources: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub enabled: bool,
    /// Number of most recent turns the rewriter may see.
    pub history_window: usize,
    pub timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_window: 4,
            timeout_ms: 1_500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GazetteerConfig {
    /// YAML file with spell/class/creature/item lists.
    pub path: Option<PathBuf>,
    /// Maximum edit distance for fuzzy matches.
    pub max_edits: usize,
    /// Names shorter than this only match exactly.
    pub min_fuzzy_len: usize,
}

impl Default for GazetteerConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_edits: 2,
            min_fuzzy_len: 4,
        }
    }
}

/// Similarity search strategy for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Exact cosine scan over leaf fields; section parents are attached, never matched.
    FieldLookup,
    /// Exact cosine scan over the eligible set.
    Exhaustive,
    /// HNSW approximate nearest neighbours over the eligible set.
    Approximate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    pub max_connections: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Fetch `k * over_fetch` neighbours before exact re-scoring.
    pub over_fetch: usize,
    /// Cached graphs per store (one per distinct eligible set).
    pub cache_capacity: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            ef_construction: 200,
            ef_search: 64,
            over_fetch: 4,
            cache_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceRetrievalConfig {
    pub k: usize,
    pub strategy: SearchStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub character_data: SourceRetrievalConfig,
    pub session_notes: SourceRetrievalConfig,
    pub rulebook: SourceRetrievalConfig,
    pub hnsw: HnswConfig,
    /// Per-source retrieval deadline.
    pub timeout_ms: u64,
}

impl Default for SourceRetrievalConfig {
    fn default() -> Self {
        Self {
            k: 5,
            strategy: SearchStrategy::Exhaustive,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            character_data: SourceRetrievalConfig {
                k: 8,
                strategy: SearchStrategy::FieldLookup,
            },
            session_notes: SourceRetrievalConfig {
                k: 5,
                strategy: SearchStrategy::Exhaustive,
            },
            rulebook: SourceRetrievalConfig {
                k: 5,
                strategy: SearchStrategy::Approximate,
            },
            hnsw: HnswConfig::default(),
            timeout_ms: 5_000,
        }
    }
}

impl RetrievalConfig {
    pub fn for_source(&self, source: Source) -> &SourceRetrievalConfig {
        match source {
            Source::CharacterData => &self.character_data,
            Source::SessionNotes => &self.session_notes,
            Source::Rulebook => &self.rulebook,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Weight of the optional context-similarity term. Zero disables it.
    pub context_weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_items: Option<usize>,
    pub max_tokens: Option<usize>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_items: Some(12),
            max_tokens: Some(2_000),
        }
    }
}

/// Where feedback records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStoreKind {
    Memory,
    Surreal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub enabled: bool,
    pub store: FeedbackStoreKind,
    /// Run the fallback classifier alongside the local one and record agreement.
    pub comparison: bool,
    pub comparison_timeout_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store: FeedbackStoreKind::Surreal,
            comparison: false,
            comparison_timeout_ms: 5_000,
        }
    }
}

/// Corpus files, relative to the data path when not absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub character_sheet: PathBuf,
    pub session_notes: PathBuf,
    pub rulebook: PathBuf,
    pub history: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            character_sheet: PathBuf::from("character.yaml"),
            session_notes: PathBuf::from("session_notes.yaml"),
            rulebook: PathBuf::from("rulebook.yaml"),
            history: PathBuf::from("history.json"),
        }
    }
}

/// One intent within a source and the categories it may retrieve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSpec {
    pub categories: Vec<String>,
}

/// Intent label to allowed category tags, per source.
///
/// Intents missing from `defaults` fall back to the first intent of the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentTable {
    pub character_data: BTreeMap<String, IntentSpec>,
    pub session_notes: BTreeMap<String, IntentSpec>,
    pub rulebook: BTreeMap<String, IntentSpec>,
    /// Default intent per source for the all-sources fallback policy.
    pub defaults: BTreeMap<Source, String>,
}

fn intents(entries: &[(&str, &[&str])]) -> BTreeMap<String, IntentSpec> {
    entries
        .iter()
        .map(|(intent, categories)| {
            (
                intent.to_string(),
                IntentSpec {
                    categories: categories.iter().map(|c| c.to_string()).collect(),
                },
            )
        })
        .collect()
}

impl Default for IntentTable {
    fn default() -> Self {
        Self {
            character_data: intents(&[
                ("basic_info", &["identity", "background"]),
                ("combat_info", &["combat", "stats"]),
                ("abilities_info", &["abilities", "stats", "skills"]),
                ("inventory_info", &["inventory", "equipment"]),
                ("magic_info", &["spells", "spellcasting"]),
                ("story_info", &["backstory", "personality", "relationships"]),
                ("progress_info", &["progression", "identity"]),
            ]),
            session_notes: intents(&[
                ("event_recap", &["events", "summary"]),
                ("npc_info", &["npcs", "relationships"]),
                ("location_info", &["locations"]),
                ("quest_progress", &["quests", "objectives"]),
                ("item_tracking", &["loot", "items"]),
            ]),
            rulebook: intents(&[
                ("spell_details", &["spells"]),
                ("class_features", &["classes", "features"]),
                ("combat_rules", &["combat", "actions"]),
                ("condition_effects", &["conditions"]),
                ("creature_stats", &["creatures"]),
                ("equipment_info", &["equipment", "items"]),
                ("general_rules", &["rules", "skills", "rest"]),
            ]),
            defaults: BTreeMap::from([
                (Source::CharacterData, "basic_info".to_string()),
                (Source::SessionNotes, "event_recap".to_string()),
                (Source::Rulebook, "general_rules".to_string()),
            ]),
        }
    }
}

impl IntentTable {
    fn for_source(&self, source: Source) -> &BTreeMap<String, IntentSpec> {
        match source {
            Source::CharacterData => &self.character_data,
            Source::SessionNotes => &self.session_notes,
            Source::Rulebook => &self.rulebook,
        }
    }

    /// Allowed categories for an intent. Unknown intents allow nothing.
    pub fn categories(&self, source: Source, intent: &str) -> &[String] {
        self.for_source(source)
            .get(intent)
            .map(|spec| spec.categories.as_slice())
            .unwrap_or(&[])
    }

    pub fn knows(&self, source: Source, intent: &str) -> bool {
        self.for_source(source).contains_key(intent)
    }

    pub fn intents(&self, source: Source) -> impl Iterator<Item = &str> {
        self.for_source(source).keys().map(String::as_str)
    }

    pub fn default_intent(&self, source: Source) -> Option<&str> {
        self.defaults
            .get(&source)
            .map(String::as_str)
            .or_else(|| self.intents(source).next())
    }
}

impl RouterConfig {
    /// Resolve a corpus path against the data directory.
    pub fn corpus_path(&self, data_path: &Path, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            data_path.join(relative)
        }
    }
}

/// Load configuration with file > env > default priority.
pub fn load_config(data_path: &Path) -> RouterConfig {
    let config_path = data_path.join("lorekeep.toml");
    if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<RouterConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    warn!(
                        "Failed to parse {}: {}. Using default.",
                        config_path.display(),
                        e
                    );
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read {}: {}. Using default.",
                    config_path.display(),
                    e
                );
            }
        }
    }

    if let Ok(json) = std::env::var("LOREKEEP_CONFIG") {
        match serde_json::from_str::<RouterConfig>(&json) {
            Ok(config) => {
                info!("Loaded config from LOREKEEP_CONFIG env");
                return config;
            }
            Err(e) => {
                warn!("Failed to parse LOREKEEP_CONFIG: {}. Using default.", e);
            }
        }
    }

    RouterConfig::default()
}
