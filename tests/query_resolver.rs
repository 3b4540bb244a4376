//! Follow-up detection and rewriting through the public resolver.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use lorekeep::config::{GazetteerConfig, ResolverConfig};
use lorekeep::gazetteer::{EntityResolver, Gazetteer};
use lorekeep::models::{KnownNames, Turn};
use lorekeep::resolver::{QueryResolver, ResolutionOutcome, RuleBasedRewriter};

fn resolver(config: ResolverConfig) -> QueryResolver {
    let entities = Arc::new(EntityResolver::new(
        &Gazetteer::builtin(),
        &GazetteerConfig::default(),
    ));
    QueryResolver::new(Arc::new(RuleBasedRewriter::new(entities)), &config)
}

fn two_spells() -> Vec<Turn> {
    vec![Turn::new(
        "Which spells should I prepare?",
        "Fireball is great for crowds and Magic Missile never misses.",
    )]
}

#[tokio::test]
async fn test_second_one_is_rewritten_to_second_spell() {
    let resolver = resolver(ResolverConfig::default());
    let query = "How does the second one work?";
    let history = two_spells();

    assert!(resolver.needs_resolution(query));
    let outcome = resolver
        .resolve(query, &history, &KnownNames::default())
        .await;

    assert_eq!(
        outcome,
        ResolutionOutcome::Rewritten {
            text: "How does Magic Missile work?".to_string()
        }
    );
    // History is read, never modified.
    assert_eq!(history, two_spells());
}

#[test]
fn test_self_contained_query_needs_no_resolution() {
    let resolver = resolver(ResolverConfig::default());
    assert!(!resolver.needs_resolution("How does Fireball work?"));
    assert!(!resolver.needs_resolution("What is my AC?"));
    assert!(!resolver.needs_resolution("What level is {CHARACTER}?"));
}

#[test]
fn test_disabled_resolver_never_triggers() {
    let resolver = resolver(ResolverConfig {
        enabled: false,
        ..Default::default()
    });
    assert!(!resolver.needs_resolution("How does the second one work?"));
}

#[tokio::test]
async fn test_antecedent_outside_window_is_unchanged() {
    let resolver = resolver(ResolverConfig {
        history_window: 2,
        ..Default::default()
    });
    let mut history = two_spells();
    history.push(Turn::new("Thanks", "Sure."));
    history.push(Turn::new("Thanks", "Sure."));

    let outcome = resolver
        .resolve("How does the second one work?", &history, &KnownNames::default())
        .await;
    assert_eq!(outcome, ResolutionOutcome::Unchanged);
    assert_eq!(
        outcome.text("How does the second one work?"),
        "How does the second one work?"
    );
}

#[tokio::test]
async fn test_pronoun_resolves_to_party_member() {
    let resolver = resolver(ResolverConfig::default());
    let known = KnownNames {
        party: vec!["Kara".to_string()],
        ..Default::default()
    };
    let history = vec![Turn::new("Where did Kara go?", "Kara went to the tavern.")];

    assert!(resolver.needs_resolution("What is she carrying?"));
    let outcome = resolver
        .resolve("What is she carrying?", &history, &known)
        .await;
    assert_eq!(outcome.text("What is she carrying?"), "What is Kara carrying?");
}
