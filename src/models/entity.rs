//! Entities recognized in query text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Entity type tag.
///
/// Gazetteer types come first, in declaration order; personal-name types
/// follow. The order doubles as the tie-break order for ambiguous matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Spell,
    Class,
    Creature,
    Item,
    Character,
    PartyMember,
    Npc,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Spell => "SPELL",
            EntityType::Class => "CLASS",
            EntityType::Creature => "CREATURE",
            EntityType::Item => "ITEM",
            EntityType::Character => "CHARACTER",
            EntityType::PartyMember => "PARTY_MEMBER",
            EntityType::Npc => "NPC",
        }
    }

    /// Whether this is a personal name that gets replaced by a placeholder.
    pub fn is_personal_name(&self) -> bool {
        matches!(
            self,
            EntityType::Character | EntityType::PartyMember | EntityType::Npc
        )
    }

    /// Base placeholder token for personal-name types.
    pub fn placeholder_base(&self) -> Option<&'static str> {
        match self {
            EntityType::Character => Some("CHARACTER"),
            EntityType::PartyMember => Some("PARTY_MEMBER"),
            EntityType::Npc => Some("NPC"),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized span in the query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Text exactly as it appears in the query.
    pub text: String,
    pub entity_type: EntityType,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// 1.0 for exact matches, lower for fuzzy matches.
    pub confidence: f32,
    /// Canonical gazetteer entry, `None` when unresolved.
    pub resolved: Option<String>,
}

impl Entity {
    /// Canonical name when resolved, surface text otherwise.
    pub fn canonical(&self) -> &str {
        self.resolved.as_deref().unwrap_or(&self.text)
    }

    pub fn overlaps(&self, other: &Entity) -> bool {
        self.start < other.end && other.start < self.end
    }
}
