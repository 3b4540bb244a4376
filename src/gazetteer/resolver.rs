//! Literal and fuzzy gazetteer matching over query text.
//!
//! Text is split into alphanumeric words; every gazetteer entry (and every
//! caller-supplied personal name) is compared against each window of the
//! same word count. Comparison is case-insensitive and punctuation-blind:
//! "tasha's hideous laughter" matches "Tasha's Hideous Laughter".
//!
//! Fuzzy tolerance: names of `min_fuzzy_len`..8 characters allow one edit,
//! longer names allow two, both capped at `max_edits`. A fuzzy window must
//! share the entry's first character and must not be a common function word
//! or ordinary rules vocabulary ("range" is not "Ranger"). Gazetteer files
//! can extend that list through their `stopwords` key.
//!
//! Overlapping matches resolve to the longer entry, then the closer match,
//! then the first-declared entry (spells, classes, creatures, items,
//! character, party, NPCs).

use std::collections::HashSet;

use rapidfuzz::distance::levenshtein;
use tracing::debug;

use crate::config::GazetteerConfig;
use crate::gazetteer::{placeholder, Gazetteer};
use crate::models::{Entity, EntityType, KnownNames, NormalizedQuery};
use crate::LorekeepError;

/// Words that are never accepted as fuzzy matches ("with" is not "Wish").
const FUZZY_STOPWORDS: &[&str] = &[
    "about", "after", "does", "from", "have", "here", "into", "much", "that", "their", "them",
    "then", "there", "these", "they", "this", "those", "what", "when", "where", "which", "while",
    "will", "with", "would", "your",
];

/// Everyday and rules words one edit away from a common entity name.
const RULES_STOPWORDS: &[&str] = &[
    "band", "bane", "bare", "barn", "bars", "beard", "bird", "board", "bold", "cure", "lice",
    "lick", "light", "mono", "rage", "range", "ranged", "rouge", "sheep", "steep",
];

#[derive(Debug, Clone)]
struct Entry {
    entity_type: EntityType,
    name: String,
    key: String,
    words: usize,
    key_chars: usize,
}

impl Entry {
    fn new(entity_type: EntityType, name: &str) -> Self {
        let key = match_key(name);
        Self {
            entity_type,
            name: name.to_string(),
            words: key.split(' ').filter(|w| !w.is_empty()).count(),
            key_chars: key.chars().count(),
            key,
        }
    }
}

#[derive(Debug)]
struct Match {
    entity: Entity,
    key_chars: usize,
    distance: usize,
    order: usize,
}

/// Matches gazetteer entries and known personal names in query text.
///
/// Immutable after construction; share it behind an `Arc`.
pub struct EntityResolver {
    entries: Vec<Entry>,
    max_edits: usize,
    min_fuzzy_len: usize,
    stopwords: HashSet<String>,
}

impl EntityResolver {
    pub fn new(gazetteer: &Gazetteer, config: &GazetteerConfig) -> Self {
        let entries = gazetteer
            .entries()
            .map(|(entity_type, name)| Entry::new(entity_type, name))
            .filter(|e| e.words > 0)
            .collect();
        let stopwords = FUZZY_STOPWORDS
            .iter()
            .chain(RULES_STOPWORDS)
            .map(|w| w.to_string())
            .chain(gazetteer.stopwords.iter().map(|w| match_key(w)))
            .collect();
        Self {
            entries,
            max_edits: config.max_edits,
            min_fuzzy_len: config.min_fuzzy_len,
            stopwords,
        }
    }

    /// Recognize entities, then swap personal names for placeholders.
    ///
    /// Finding nothing is not an error. The only failure is a placeholder
    /// mapping that does not round-trip, which is fatal.
    pub fn resolve(&self, text: &str, known: &KnownNames) -> Result<NormalizedQuery, LorekeepError> {
        let entities = self.find_entities(text, known);
        placeholder::normalize(text, entities)
    }

    /// Non-overlapping entities ordered by position. Never fails.
    pub fn find_entities(&self, text: &str, known: &KnownNames) -> Vec<Entity> {
        let words = word_spans(text);
        if words.is_empty() {
            return Vec::new();
        }

        let personal = personal_entries(known);
        let mut matches = Vec::new();
        for (order, entry) in self.entries.iter().chain(personal.iter()).enumerate() {
            if entry.words > words.len() {
                continue;
            }
            for window in words.windows(entry.words) {
                let start = window[0].0;
                let end = window[entry.words - 1].1;
                let key = window
                    .iter()
                    .map(|&(s, e)| text[s..e].to_lowercase())
                    .collect::<Vec<_>>()
                    .join(" ");
                let distance = if key == entry.key {
                    0
                } else {
                    match self.fuzzy_distance(&key, entry) {
                        Some(d) => d,
                        None => continue,
                    }
                };
                matches.push(Match {
                    entity: Entity {
                        text: text[start..end].to_string(),
                        entity_type: entry.entity_type,
                        start,
                        end,
                        confidence: 1.0 - distance as f32 / entry.key_chars as f32,
                        resolved: Some(entry.name.clone()),
                    },
                    key_chars: entry.key_chars,
                    distance,
                    order,
                });
            }
        }

        matches.sort_by(|a, b| {
            b.key_chars
                .cmp(&a.key_chars)
                .then(a.distance.cmp(&b.distance))
                .then(a.order.cmp(&b.order))
                .then(a.entity.start.cmp(&b.entity.start))
        });

        let mut accepted: Vec<Entity> = Vec::new();
        for m in matches {
            if accepted.iter().all(|a| !a.overlaps(&m.entity)) {
                accepted.push(m.entity);
            }
        }
        accepted.sort_by_key(|e| e.start);

        debug!(count = accepted.len(), "Entities recognized");
        accepted
    }

    fn fuzzy_distance(&self, window: &str, entry: &Entry) -> Option<usize> {
        if entry.key_chars < self.min_fuzzy_len {
            return None;
        }
        let base: usize = if entry.key_chars >= 8 { 2 } else { 1 };
        let tolerance = base.min(self.max_edits);
        if tolerance == 0 {
            return None;
        }
        let window_chars = window.chars().count();
        if window_chars < self.min_fuzzy_len || window_chars.abs_diff(entry.key_chars) > tolerance {
            return None;
        }
        if window.chars().next() != entry.key.chars().next() {
            return None;
        }
        if self.stopwords.contains(window) {
            return None;
        }
        let distance = levenshtein::distance(window.chars(), entry.key.chars());
        (distance <= tolerance).then_some(distance)
    }
}

fn personal_entries(known: &KnownNames) -> Vec<Entry> {
    let character = known
        .character
        .iter()
        .map(|n| Entry::new(EntityType::Character, n));
    let party = known
        .party
        .iter()
        .map(|n| Entry::new(EntityType::PartyMember, n));
    let npcs = known.npcs.iter().map(|n| Entry::new(EntityType::Npc, n));
    character
        .chain(party)
        .chain(npcs)
        .filter(|e| e.words > 0)
        .collect()
}

/// Byte spans of maximal alphanumeric runs.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_alphanumeric(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Lowercased words joined by single spaces.
fn match_key(text: &str) -> String {
    word_spans(text)
        .into_iter()
        .map(|(s, e)| text[s..e].to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
