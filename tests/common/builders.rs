//! Fixture corpora and candidate builders.

#![allow(dead_code)]

use lorekeep::models::{Entity, EntityType, Item, ParentSection, RetrievalCandidate, Source};

/// Character data for "Duskryn", a level 5 wizard.
pub fn character_items() -> Vec<Item> {
    vec![
        Item::new("character.name", "Name", "Duskryn").with_categories(&["identity"]),
        Item::new(
            "character.combat",
            "Combat (Duskryn)",
            "Armor Class: 15\nHit Points: 38\nSpeed: 30 ft",
        )
        .with_categories(&["combat", "stats"]),
        Item::new("character.combat.armor_class", "Armor Class", "15 (Mage Armor)")
            .with_categories(&["combat", "stats"])
            .with_parent("character.combat"),
        Item::new("character.combat.hit_points", "Hit Points", "38")
            .with_categories(&["combat", "stats"])
            .with_parent("character.combat"),
        Item::new("character.combat.speed", "Speed", "30 ft")
            .with_categories(&["combat", "stats"])
            .with_parent("character.combat"),
        Item::new("character.identity", "Identity (Duskryn)", "Class: Wizard\nLevel: 5")
            .with_categories(&["identity"]),
        Item::new("character.identity.level", "Level", "5")
            .with_categories(&["progression", "identity"])
            .with_parent("character.identity"),
        Item::new("character.identity.class", "Class", "Wizard")
            .with_categories(&["identity"])
            .with_parent("character.identity"),
    ]
}

pub fn session_items() -> Vec<Item> {
    vec![
        Item::new(
            "session.01",
            "Session 1: Goblin ambush",
            "The party was ambushed by goblins on the road to Phandalin.",
        )
        .with_categories(&["events", "summary"]),
        Item::new(
            "session.02",
            "Session 2: Cragmaw hideout",
            "We cleared the goblin hideout and rescued Sildar.",
        )
        .with_categories(&["events", "summary", "quests"]),
        Item::new("npc.sildar", "Sildar Hallwinter", "Knight of the Lords' Alliance.")
            .with_categories(&["npcs"]),
    ]
}

/// Rulebook sections. Nothing is tagged `conditions`.
pub fn rulebook_items() -> Vec<Item> {
    vec![
        Item::new("spells", "Spells", "Spell descriptions, alphabetical.")
            .with_categories(&["rules"]),
        Item::new(
            "spells.fireball",
            "Fireball",
            "A bright streak flashes to a point you choose and blossoms into flame. 8d6 fire damage.",
        )
        .with_categories(&["spells"])
        .with_parent("spells"),
        Item::new(
            "spells.magic_missile",
            "Magic Missile",
            "Three glowing darts of magical force. Each dart deals 1d4 + 1 force damage.",
        )
        .with_categories(&["spells"])
        .with_parent("spells"),
        Item::new(
            "spells.shield",
            "Shield",
            "An invisible barrier of magical force grants +5 to AC until your next turn.",
        )
        .with_categories(&["spells"])
        .with_parent("spells"),
        Item::new(
            "combat.grapple",
            "Grappling",
            "Use the Attack action to make a special melee attack, a grapple.",
        )
        .with_categories(&["combat", "actions"]),
        Item::new("rest.short", "Short Rest", "A period of downtime, at least 1 hour long.")
            .with_categories(&["rules", "rest"]),
    ]
}

/// Fluent builder for ranked or unranked candidates.
pub struct CandidateBuilder {
    candidate: RetrievalCandidate,
}

impl CandidateBuilder {
    pub fn new(source: Source, item_id: &str) -> Self {
        let item = Item::new(item_id, item_id, "");
        Self {
            candidate: RetrievalCandidate::from_item(source, &item, 0.0),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.candidate.title = title.to_string();
        self
    }

    pub fn content(mut self, content: &str) -> Self {
        self.candidate.content = content.to_string();
        self
    }

    pub fn semantic(mut self, score: f32) -> Self {
        self.candidate.semantic_score = score;
        self
    }

    /// Sets the fused score directly, for assembly tests that skip ranking.
    pub fn fused(mut self, score: f32) -> Self {
        self.candidate.fused_score = score;
        self
    }

    pub fn embedding(mut self, vector: Vec<f32>) -> Self {
        self.candidate.embedding = Some(vector);
        self
    }

    pub fn parent(mut self, id: &str, title: &str, content: &str) -> Self {
        self.candidate.parent_id = Some(id.to_string());
        self.candidate.parent = Some(ParentSection {
            item_id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
        });
        self
    }

    pub fn build(self) -> RetrievalCandidate {
        self.candidate
    }
}

/// A resolved gazetteer entity at `start`.
pub fn entity(text: &str, entity_type: EntityType, start: usize) -> Entity {
    Entity {
        text: text.to_string(),
        entity_type,
        start,
        end: start + text.len(),
        confidence: 1.0,
        resolved: Some(text.to_string()),
    }
}
