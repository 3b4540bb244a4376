//! Gazetteer lists and entity resolution.
//!
//! The gazetteer is a set of flat name lists per entity type, loaded once at
//! startup and read-only afterwards. [`EntityResolver`] matches them (plus
//! the caller's personal names) against query text; [`normalize`] swaps the
//! personal names for placeholder tokens.

pub mod placeholder;
pub mod resolver;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::EntityType;
use crate::LorekeepError;

pub use placeholder::{normalize, restore_placeholders};
pub use resolver::EntityResolver;

/// Known entity names by type. Declaration order (field order, then list
/// order) is the tie-break order for ambiguous matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gazetteer {
    pub spells: Vec<String>,
    pub classes: Vec<String>,
    pub creatures: Vec<String>,
    pub items: Vec<String>,
    /// Extra words never accepted as fuzzy matches.
    pub stopwords: Vec<String>,
}

const BUILTIN_SPELLS: &[&str] = &[
    "Acid Splash",
    "Bless",
    "Burning Hands",
    "Counterspell",
    "Cure Wounds",
    "Detect Magic",
    "Dimension Door",
    "Eldritch Blast",
    "Faerie Fire",
    "Fire Bolt",
    "Fireball",
    "Guidance",
    "Healing Word",
    "Hold Person",
    "Lightning Bolt",
    "Mage Armor",
    "Mage Hand",
    "Magic Missile",
    "Misty Step",
    "Polymorph",
    "Sacred Flame",
    "Shield",
    "Sleep",
    "Spiritual Weapon",
    "Thunderwave",
];

const BUILTIN_CLASSES: &[&str] = &[
    "Artificer",
    "Barbarian",
    "Bard",
    "Cleric",
    "Druid",
    "Fighter",
    "Monk",
    "Paladin",
    "Ranger",
    "Rogue",
    "Sorcerer",
    "Warlock",
    "Wizard",
];

const BUILTIN_CREATURES: &[&str] = &[
    "Beholder",
    "Bugbear",
    "Dragon",
    "Gelatinous Cube",
    "Ghoul",
    "Goblin",
    "Hobgoblin",
    "Kobold",
    "Lich",
    "Mimic",
    "Mind Flayer",
    "Ogre",
    "Owlbear",
    "Skeleton",
    "Troll",
    "Vampire",
    "Zombie",
];

const BUILTIN_ITEMS: &[&str] = &[
    "Bag of Holding",
    "Chain Mail",
    "Healing Potion",
    "Leather Armor",
    "Longsword",
    "Plate Armor",
    "Potion of Healing",
    "Quarterstaff",
    "Rapier",
    "Shortbow",
    "Spell Scroll",
    "Thieves' Tools",
];

fn typed(
    entity_type: EntityType,
    names: &[String],
) -> impl Iterator<Item = (EntityType, &str)> + '_ {
    names.iter().map(move |n| (entity_type, n.as_str()))
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

impl Gazetteer {
    /// Compact SRD-style lists used when no gazetteer file is configured.
    pub fn builtin() -> Self {
        Self {
            spells: owned(BUILTIN_SPELLS),
            classes: owned(BUILTIN_CLASSES),
            creatures: owned(BUILTIN_CREATURES),
            items: owned(BUILTIN_ITEMS),
            stopwords: Vec::new(),
        }
    }

    /// Load lists from a YAML file with `spells`, `classes`, `creatures` and
    /// `items` keys, plus an optional `stopwords` list. Missing keys are empty
    /// lists.
    pub fn load(path: &Path) -> Result<Self, LorekeepError> {
        let contents = std::fs::read_to_string(path)?;
        let gazetteer: Gazetteer = serde_yaml_ng::from_str(&contents)?;
        info!(
            spells = gazetteer.spells.len(),
            classes = gazetteer.classes.len(),
            creatures = gazetteer.creatures.len(),
            items = gazetteer.items.len(),
            "Loaded gazetteer from {}",
            path.display()
        );
        Ok(gazetteer)
    }

    /// Every entry in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (EntityType, &str)> {
        typed(EntityType::Spell, &self.spells)
            .chain(typed(EntityType::Class, &self.classes))
            .chain(typed(EntityType::Creature, &self.creatures))
            .chain(typed(EntityType::Item, &self.items))
    }

    pub fn len(&self) -> usize {
        self.spells.len() + self.classes.len() + self.creatures.len() + self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_follow_declaration_order() {
        let gazetteer = Gazetteer {
            spells: vec!["Fireball".into()],
            classes: vec!["Wizard".into()],
            creatures: vec!["Owlbear".into()],
            items: vec!["Rapier".into()],
            stopwords: vec!["range".into()],
        };
        let types: Vec<EntityType> = gazetteer.entries().map(|(t, _)| t).collect();
        assert_eq!(
            types,
            vec![
                EntityType::Spell,
                EntityType::Class,
                EntityType::Creature,
                EntityType::Item
            ]
        );
    }

    #[test]
    fn test_load_partial_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gazetteer.yaml");
        std::fs::write(&path, "spells:\n  - Fireball\n  - Shield\nclasses: [Wizard]\n").unwrap();
        let gazetteer = Gazetteer::load(&path).unwrap();
        assert_eq!(gazetteer.spells, vec!["Fireball", "Shield"]);
        assert_eq!(gazetteer.classes, vec!["Wizard"]);
        assert!(gazetteer.creatures.is_empty());
        assert_eq!(gazetteer.len(), 3);
    }

    #[test]
    fn test_load_invalid_yaml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gazetteer.yaml");
        std::fs::write(&path, "spells: [unclosed").unwrap();
        let err = Gazetteer::load(&path).unwrap_err();
        assert!(matches!(err, LorekeepError::Config(_)));
    }

    #[test]
    fn test_builtin_is_populated() {
        let gazetteer = Gazetteer::builtin();
        assert!(gazetteer.spells.iter().any(|s| s == "Fireball"));
        assert!(!gazetteer.is_empty());
    }
}
