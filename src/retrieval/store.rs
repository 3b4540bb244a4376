//! Knowledge stores: the items each source can retrieve from.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingService;
use crate::models::{Item, Source};
use crate::LorekeepError;

/// Read-only access to one source's items and their embeddings.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    fn source(&self) -> Source;

    /// Items tagged with any of `categories`, ordered by id.
    async fn get_items_by_category(&self, categories: &[String]) -> Result<Vec<Item>, LorekeepError>;

    /// Embedding of an item, computed on first use if the corpus has none.
    async fn get_embedding(&self, item_id: &str) -> Result<Vec<f32>, LorekeepError>;

    async fn get_item(&self, item_id: &str) -> Result<Option<Item>, LorekeepError>;
}

/// Corpus file layout for session notes and rulebook sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusFile {
    #[serde(default)]
    pub items: Vec<Item>,
}

/// In-memory store over a YAML corpus.
pub struct CorpusStore {
    source: Source,
    items: Vec<Item>,
    by_id: HashMap<String, usize>,
    embedder: Arc<dyn EmbeddingService>,
    embeddings: Cache<String, Arc<Vec<f32>>>,
}

impl CorpusStore {
    pub fn new(
        source: Source,
        mut items: Vec<Item>,
        embedder: Arc<dyn EmbeddingService>,
    ) -> Result<Self, LorekeepError> {
        items.sort_by(|a, b| a.id.cmp(&b.id));
        let mut by_id = HashMap::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            if by_id.insert(item.id.clone(), idx).is_some() {
                return Err(LorekeepError::Config(format!(
                    "Duplicate item id '{}' in {} corpus",
                    item.id, source
                )));
            }
        }
        let capacity = items.len().max(1) as u64;
        Ok(Self {
            source,
            items,
            by_id,
            embedder,
            embeddings: Cache::builder().max_capacity(capacity).build(),
        })
    }

    /// Load a corpus file for `source`.
    ///
    /// Character data is read as a [`CharacterSheet`]; other sources as a
    /// [`CorpusFile`]. A missing file yields an empty store.
    pub fn load(
        source: Source,
        path: &Path,
        embedder: Arc<dyn EmbeddingService>,
    ) -> Result<Self, LorekeepError> {
        if !path.exists() {
            warn!(source = %source, "Corpus file {} not found, source is empty", path.display());
            return Self::new(source, Vec::new(), embedder);
        }
        let contents = std::fs::read_to_string(path)?;
        let items = match source {
            Source::CharacterData => {
                let sheet: CharacterSheet = serde_yaml_ng::from_str(&contents)?;
                sheet.into_items()
            }
            _ => {
                let file: CorpusFile = serde_yaml_ng::from_str(&contents)?;
                file.items
            }
        };
        info!(source = %source, items = items.len(), "Loaded corpus from {}", path.display());
        Self::new(source, items, embedder)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Embed every item without a shipped embedding in one batch.
    ///
    /// Returns the number of embeddings computed; zero when the embedder is
    /// unavailable.
    pub async fn precompute_embeddings(&self) -> Result<usize, LorekeepError> {
        if !self.embedder.is_available() {
            return Ok(0);
        }
        let pending: Vec<&Item> = self.items.iter().filter(|i| i.embedding.is_none()).collect();
        if pending.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = pending.iter().map(|i| i.embedding_text()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        for (item, vector) in pending.iter().zip(vectors) {
            self.embeddings.insert(item.id.clone(), Arc::new(vector)).await;
        }
        debug!(source = %self.source, count = pending.len(), "Precomputed item embeddings");
        Ok(pending.len())
    }
}

#[async_trait]
impl KnowledgeStore for CorpusStore {
    fn source(&self) -> Source {
        self.source
    }

    async fn get_items_by_category(&self, categories: &[String]) -> Result<Vec<Item>, LorekeepError> {
        Ok(self
            .items
            .iter()
            .filter(|item| item.matches_any(categories))
            .cloned()
            .collect())
    }

    async fn get_embedding(&self, item_id: &str) -> Result<Vec<f32>, LorekeepError> {
        let item = self
            .by_id
            .get(item_id)
            .map(|&idx| &self.items[idx])
            .ok_or_else(|| LorekeepError::NotFound {
                entity_type: format!("{} item", self.source),
                id: item_id.to_string(),
            })?;
        if let Some(embedding) = &item.embedding {
            return Ok(embedding.clone());
        }
        if let Some(hit) = self.embeddings.get(item_id).await {
            return Ok(hit.as_ref().clone());
        }
        let vector = self.embedder.embed_text(&item.embedding_text()).await?;
        self.embeddings
            .insert(item_id.to_string(), Arc::new(vector.clone()))
            .await;
        Ok(vector)
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<Item>, LorekeepError> {
        Ok(self.by_id.get(item_id).map(|&idx| self.items[idx].clone()))
    }
}

/// A character sheet as written by the player.
///
/// Every top-level mapping becomes a section: one parent item
/// `character.<section>` plus one child item per field,
/// `character.<section>.<field>`. Scalar or list sections become a single
/// item with no children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterSheet {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub sections: BTreeMap<String, Value>,
}

fn section_categories(section: &str) -> Vec<String> {
    let tags: &[&str] = match section {
        "identity" => &["identity"],
        "background" => &["background"],
        "combat" => &["combat", "stats"],
        "abilities" | "ability_scores" => &["abilities", "stats"],
        "skills" | "proficiencies" => &["skills"],
        "inventory" => &["inventory"],
        "equipment" => &["equipment", "inventory"],
        "spells" | "spellcasting" => &["spells", "spellcasting"],
        "backstory" => &["backstory"],
        "personality" => &["personality"],
        "relationships" | "allies" => &["relationships"],
        "progression" => &["progression"],
        other => return vec![other.to_string()],
    };
    tags.iter().map(|t| t.to_string()).collect()
}

/// Fields that belong somewhere other than their section.
fn field_categories(field: &str) -> Option<&'static [&'static str]> {
    match field {
        "level" | "experience" | "xp" => Some(&["progression", "identity"]),
        "armor_class" | "hit_points" | "speed" | "initiative" => Some(&["combat", "stats"]),
        "proficiency_bonus" => Some(&["stats", "skills"]),
        "spell_slots" | "spell_save_dc" | "spell_attack_bonus" => Some(&["spellcasting"]),
        _ => None,
    }
}

/// `armor_class` -> `Armor Class`.
fn humanize(key: &str) -> String {
    key.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(seq) => seq.iter().map(render).collect::<Vec<_>>().join(", "),
        Value::Mapping(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", humanize(&key_str(k)), render(v)))
            .collect::<Vec<_>>()
            .join("; "),
        Value::Tagged(tagged) => render(&tagged.value),
    }
}

fn key_str(key: &Value) -> String {
    match key.as_str() {
        Some(s) => s.to_string(),
        None => render(key),
    }
}

impl CharacterSheet {
    pub fn into_items(self) -> Vec<Item> {
        let mut items = Vec::new();
        if !self.name.is_empty() {
            items.push(
                Item::new("character.name", "Name", self.name.clone()).with_categories(&["identity"]),
            );
        }

        for (section, value) in &self.sections {
            let section_id = format!("character.{section}");
            let categories = section_categories(section);
            let Value::Mapping(fields) = value else {
                let mut item = Item::new(section_id, humanize(section), render(value));
                item.categories = categories;
                items.push(item);
                continue;
            };

            let mut lines = Vec::with_capacity(fields.len());
            for (key, field_value) in fields {
                let field = key_str(key);
                let title = humanize(&field);
                let body = render(field_value);
                lines.push(format!("{title}: {body}"));

                let mut child = Item::new(format!("{section_id}.{field}"), title, body)
                    .with_parent(section_id.clone());
                child.categories = match field_categories(&field) {
                    Some(tags) => tags.iter().map(|t| t.to_string()).collect(),
                    None => categories.clone(),
                };
                items.push(child);
            }

            let title = if self.name.is_empty() {
                humanize(section)
            } else {
                format!("{} ({})", humanize(section), self.name)
            };
            let mut parent = Item::new(section_id, title, lines.join("\n"));
            parent.categories = categories;
            items.push(parent);
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::embedding::NoopEmbeddingService;

    const SHEET: &str = r#"
name: Duskryn
identity:
  race: Tiefling
  class: Wizard
  level: 5
combat:
  armor_class: 15
  hit_points: 38
spells:
  prepared: [Fireball, Shield]
backstory: Raised in the Ashen Library.
"#;

    fn sheet_items() -> Vec<Item> {
        let sheet: CharacterSheet = serde_yaml_ng::from_str(SHEET).unwrap();
        sheet.into_items()
    }

    fn find<'a>(items: &'a [Item], id: &str) -> &'a Item {
        items.iter().find(|i| i.id == id).unwrap()
    }

    #[test]
    fn test_sheet_flattens_into_sections_and_fields() {
        let items = sheet_items();
        let ac = find(&items, "character.combat.armor_class");
        assert_eq!(ac.title, "Armor Class");
        assert_eq!(ac.body, "15");
        assert_eq!(ac.parent_id.as_deref(), Some("character.combat"));
        assert_eq!(ac.categories, vec!["combat", "stats"]);

        let combat = find(&items, "character.combat");
        assert_eq!(combat.body, "Armor Class: 15\nHit Points: 38");
        assert!(combat.parent_id.is_none());
    }

    #[test]
    fn test_field_overrides_section_categories() {
        let items = sheet_items();
        assert_eq!(
            find(&items, "character.identity.level").categories,
            vec!["progression", "identity"]
        );
        assert_eq!(find(&items, "character.identity.race").categories, vec!["identity"]);
    }

    #[test]
    fn test_scalar_section_and_lists_render() {
        let items = sheet_items();
        assert_eq!(
            find(&items, "character.spells.prepared").body,
            "Fireball, Shield"
        );
        let backstory = find(&items, "character.backstory");
        assert_eq!(backstory.body, "Raised in the Ashen Library.");
        assert_eq!(backstory.categories, vec!["backstory"]);
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("armor_class"), "Armor Class");
        assert_eq!(humanize("spell-save_dc"), "Spell Save Dc");
        assert_eq!(humanize("hp"), "Hp");
    }

    #[tokio::test]
    async fn test_category_filter_is_ordered_by_id() {
        let store = CorpusStore::new(
            Source::CharacterData,
            sheet_items(),
            Arc::new(NoopEmbeddingService::new()),
        )
        .unwrap();
        let items = store
            .get_items_by_category(&["combat".to_string()])
            .await
            .unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "character.combat",
                "character.combat.armor_class",
                "character.combat.hit_points"
            ]
        );
        assert!(store
            .get_items_by_category(&["quests".to_string()])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_shipped_embeddings_skip_the_model() {
        let mut item = Item::new("r.fireball", "Fireball", "8d6 fire");
        item.embedding = Some(vec![1.0, 0.0]);
        let store = CorpusStore::new(
            Source::Rulebook,
            vec![item],
            Arc::new(NoopEmbeddingService::new()),
        )
        .unwrap();
        assert_eq!(store.get_embedding("r.fireball").await.unwrap(), vec![1.0, 0.0]);
        assert!(matches!(
            store.get_embedding("r.missing").await.unwrap_err(),
            LorekeepError::NotFound { .. }
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let items = vec![Item::new("a", "A", ""), Item::new("a", "A again", "")];
        let err = CorpusStore::new(
            Source::SessionNotes,
            items,
            Arc::new(NoopEmbeddingService::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, LorekeepError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::load(
            Source::Rulebook,
            &dir.path().join("nope.yaml"),
            Arc::new(NoopEmbeddingService::new()),
        )
        .unwrap();
        assert!(store.is_empty());
    }
}
