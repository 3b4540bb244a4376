//! Conversation context and normalized queries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::entity::Entity;

/// A prior question/answer exchange in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub response: String,
}

impl Turn {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
        }
    }
}

/// Personal names currently in scope for the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownNames {
    /// The active character's name.
    #[serde(default)]
    pub character: Option<String>,
    /// Party roster (excluding the active character).
    #[serde(default)]
    pub party: Vec<String>,
    /// Known NPCs.
    #[serde(default)]
    pub npcs: Vec<String>,
}

impl KnownNames {
    pub fn with_character(name: impl Into<String>) -> Self {
        Self {
            character: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.character.is_none() && self.party.is_empty() && self.npcs.is_empty()
    }
}

/// Caller-owned conversation state for one query.
///
/// The pipeline only reads it; the caller isolates and updates history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Prior turns, oldest first.
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default)]
    pub known: KnownNames,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_known(mut self, known: KnownNames) -> Self {
        self.known = known;
        self
    }
}

/// A query with personal names swapped for placeholder tokens.
///
/// `placeholders` maps each token to the exact surface text it replaced, so
/// [`crate::gazetteer::restore_placeholders`] reproduces `original` byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedQuery {
    pub original: String,
    pub text: String,
    pub placeholders: BTreeMap<String, String>,
    pub entities: Vec<Entity>,
}

impl NormalizedQuery {
    /// Real name behind a placeholder token, if any.
    pub fn name_for(&self, token: &str) -> Option<&str> {
        self.placeholders.get(token).map(String::as_str)
    }
}
