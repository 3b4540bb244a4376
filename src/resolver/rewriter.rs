//! Rewrite backends for follow-up queries.

use std::sync::Arc;

use async_trait::async_trait;

use crate::gazetteer::EntityResolver;
use crate::models::{Entity, EntityType, KnownNames, Turn};
use crate::resolver::heuristics::{self, ReferenceKind, Word};
use crate::LorekeepError;

/// Turns an anaphoric query into a self-contained one.
///
/// Must be a pure function of its inputs: no history mutation, same output
/// for the same input. Returning the input unchanged means "could not
/// resolve".
#[async_trait]
pub trait RewriteBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn rewrite(
        &self,
        text: &str,
        history: &[Turn],
        known: &KnownNames,
    ) -> Result<String, LorekeepError>;
}

/// Nouns that name an entity type after a demonstrative ("that spell").
fn type_noun(word: &str) -> Option<EntityType> {
    match word {
        "spell" | "cantrip" => Some(EntityType::Spell),
        "class" | "subclass" => Some(EntityType::Class),
        "creature" | "monster" | "beast" | "enemy" => Some(EntityType::Creature),
        "item" | "weapon" | "armor" | "potion" => Some(EntityType::Item),
        _ => None,
    }
}

/// Deterministic rule-based rewriter.
///
/// Antecedents are the entities mentioned in the most recent history turn
/// that mentions any, ordered by position across the turn's query then
/// response. Ordinals pick by position ("the second one"), `last`/`latter`
/// and `former` pick the ends, pronouns pick the most recent mention of a
/// fitting kind.
pub struct RuleBasedRewriter {
    resolver: Arc<EntityResolver>,
}

impl RuleBasedRewriter {
    pub fn new(resolver: Arc<EntityResolver>) -> Self {
        Self { resolver }
    }

    /// Distinct entity mentions of the latest turn that has any.
    pub fn antecedents(&self, history: &[Turn], known: &KnownNames) -> Vec<Entity> {
        for turn in history.iter().rev() {
            let mut mentions: Vec<Entity> = Vec::new();
            for part in [&turn.query, &turn.response] {
                for entity in self.resolver.find_entities(part, known) {
                    if !mentions.iter().any(|m| m.canonical() == entity.canonical()) {
                        mentions.push(entity);
                    }
                }
            }
            if !mentions.is_empty() {
                return mentions;
            }
        }
        Vec::new()
    }

    fn rewrite_sync(&self, text: &str, history: &[Turn], known: &KnownNames) -> String {
        let mentions = self.antecedents(history, known);
        if mentions.is_empty() {
            return text.to_string();
        }

        let words = heuristics::words(text);
        let mut edits: Vec<(usize, usize, String)> = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let lower = words[i].text.to_lowercase();
            let Some(kind) = heuristics::reference_kind(&lower) else {
                i += 1;
                continue;
            };
            match substitution(kind, &words, i, &mentions) {
                Some((first, last, replacement)) => {
                    edits.push((words[first].start, words[last].end, replacement));
                    i = last + 1;
                }
                None => i += 1,
            }
        }

        let mut out = text.to_string();
        for (start, end, replacement) in edits.into_iter().rev() {
            out.replace_range(start..end, &replacement);
        }
        out
    }
}

/// Replacement for the reference at `i`: (first word, last word, text).
fn substitution(
    kind: ReferenceKind,
    words: &[Word<'_>],
    i: usize,
    mentions: &[Entity],
) -> Option<(usize, usize, String)> {
    let next = words.get(i + 1).map(|w| w.text.to_lowercase());
    let prev_is_the = i > 0 && words[i - 1].text.eq_ignore_ascii_case("the");
    let first = if prev_is_the { i - 1 } else { i };
    let name = |e: &Entity| e.canonical().to_string();

    match kind {
        ReferenceKind::Ordinal(_) | ReferenceKind::Last | ReferenceKind::Former => {
            let pick = match kind {
                ReferenceKind::Ordinal(n) => mentions.get(n - 1),
                ReferenceKind::Last => mentions.last(),
                _ => mentions.first(),
            }?;
            let ends_with_one = matches!(next.as_deref(), Some("one") | Some("ones"));
            if ends_with_one {
                Some((first, i + 1, name(pick)))
            } else if prev_is_the && !matches!(kind, ReferenceKind::Ordinal(_)) {
                Some((first, i, name(pick)))
            } else {
                None
            }
        }
        ReferenceKind::Demonstrative => {
            if let Some(wanted) = next.as_deref().and_then(type_noun) {
                let pick = mentions.iter().rev().find(|m| m.entity_type == wanted)?;
                Some((i, i + 1, name(pick)))
            } else if words.get(i + 1).map_or(true, |w| w.sentence != words[i].sentence) {
                mentions.last().map(|m| (i, i, name(m)))
            } else {
                None
            }
        }
        ReferenceKind::Neuter => {
            let pick = mentions
                .iter()
                .rev()
                .find(|m| !m.entity_type.is_personal_name())?;
            Some((i, i, name(pick)))
        }
        ReferenceKind::Personal | ReferenceKind::Possessive => {
            let is_its = words[i].text.eq_ignore_ascii_case("its");
            let pick = if is_its {
                mentions.iter().rev().find(|m| !m.entity_type.is_personal_name())
            } else {
                mentions.iter().rev().find(|m| m.entity_type.is_personal_name())
            }?;
            let replacement = if kind == ReferenceKind::Possessive {
                format!("{}'s", pick.canonical())
            } else {
                name(pick)
            };
            Some((i, i, replacement))
        }
    }
}

#[async_trait]
impl RewriteBackend for RuleBasedRewriter {
    fn name(&self) -> &str {
        "rule_based"
    }

    async fn rewrite(
        &self,
        text: &str,
        history: &[Turn],
        known: &KnownNames,
    ) -> Result<String, LorekeepError> {
        Ok(self.rewrite_sync(text, history, known))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::GazetteerConfig;
    use crate::gazetteer::Gazetteer;

    fn rewriter() -> RuleBasedRewriter {
        let gazetteer = Gazetteer::builtin();
        RuleBasedRewriter::new(Arc::new(EntityResolver::new(
            &gazetteer,
            &GazetteerConfig::default(),
        )))
    }

    fn spell_history() -> Vec<Turn> {
        vec![Turn::new(
            "Which spells did I prepare?",
            "You prepared Magic Missile and Shield.",
        )]
    }

    async fn rewrite(text: &str, history: &[Turn], known: &KnownNames) -> String {
        rewriter().rewrite(text, history, known).await.unwrap()
    }

    #[tokio::test]
    async fn test_second_one_names_second_mention() {
        let out = rewrite(
            "How does the second one work?",
            &spell_history(),
            &KnownNames::default(),
        )
        .await;
        assert_eq!(out, "How does Shield work?");
    }

    #[tokio::test]
    async fn test_former_and_last() {
        let known = KnownNames::default();
        assert_eq!(
            rewrite("Is the former better?", &spell_history(), &known).await,
            "Is Magic Missile better?"
        );
        assert_eq!(
            rewrite("What about the last one?", &spell_history(), &known).await,
            "What about Shield?"
        );
    }

    #[tokio::test]
    async fn test_it_and_demonstrative_type_noun() {
        let history = vec![Turn::new("Tell me about Fireball", "Fireball deals 8d6.")];
        let known = KnownNames::default();
        assert_eq!(
            rewrite("Does it scale?", &history, &known).await,
            "Does Fireball scale?"
        );
        assert_eq!(
            rewrite("What range does that spell have?", &history, &known).await,
            "What range does Fireball have?"
        );
    }

    #[tokio::test]
    async fn test_personal_pronouns_use_personal_names() {
        let known = KnownNames {
            party: vec!["Mira".into()],
            ..Default::default()
        };
        let history = vec![Turn::new("What does Mira carry?", "Mira carries a Longsword.")];
        assert_eq!(
            rewrite("What level is she?", &history, &known).await,
            "What level is Mira?"
        );
        assert_eq!(
            rewrite("Is his armor good?", &history, &known).await,
            "Is Mira's armor good?"
        );
    }

    #[tokio::test]
    async fn test_out_of_range_ordinal_left_alone() {
        let out = rewrite(
            "How does the fifth one work?",
            &spell_history(),
            &KnownNames::default(),
        )
        .await;
        assert_eq!(out, "How does the fifth one work?");
    }

    #[tokio::test]
    async fn test_no_history_is_unchanged() {
        let out = rewrite("Does it scale?", &[], &KnownNames::default()).await;
        assert_eq!(out, "Does it scale?");
    }

    #[test]
    fn test_antecedents_come_from_latest_turn_with_mentions() {
        let history = vec![
            Turn::new("Tell me about Fireball", "Sure."),
            Turn::new("Thanks", "You're welcome."),
        ];
        let mentions = rewriter().antecedents(&history, &KnownNames::default());
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].canonical(), "Fireball");
    }
}
