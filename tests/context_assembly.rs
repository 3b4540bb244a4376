//! Budgeted assembly of ranked candidates into one context.

mod common;

use std::collections::{BTreeMap, HashMap};

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use common::CandidateBuilder;
use lorekeep::assembly::{Budget, ContextAssembler};
use lorekeep::models::{Inclusion, RankedContext, RetrievalCandidate, Source};
use lorekeep::ranking::compare_ranked;

fn by_source(candidates: Vec<RetrievalCandidate>) -> BTreeMap<Source, Vec<RetrievalCandidate>> {
    let mut map: BTreeMap<Source, Vec<RetrievalCandidate>> = BTreeMap::new();
    for c in candidates {
        map.entry(c.source).or_default().push(c);
    }
    map
}

fn ids(ctx: &RankedContext) -> Vec<&str> {
    ctx.entries.iter().map(|e| e.item_id.as_str()).collect()
}

#[test]
fn test_empty_input_gives_empty_context() {
    let ctx = ContextAssembler::new().assemble(BTreeMap::new(), Budget::unbounded());
    assert!(ctx.entries.is_empty());
    assert_eq!(ctx.estimated_tokens, 0);
    assert_eq!(ctx.dropped, 0);
}

#[test]
fn test_item_limit_keeps_highest_scores() {
    let candidates = (0..6)
        .map(|i| {
            CandidateBuilder::new(Source::SessionNotes, &format!("session.{i:02}"))
                .content("short note")
                .fused(1.0 - i as f32 * 0.1)
                .build()
        })
        .collect();

    let ctx = ContextAssembler::new().assemble(
        by_source(candidates),
        Budget {
            max_items: Some(4),
            max_tokens: None,
        },
    );

    assert_eq!(
        ids(&ctx),
        vec!["session.00", "session.01", "session.02", "session.03"]
    );
    assert_eq!(ctx.dropped, 2);
}

#[test]
fn test_unit_that_does_not_fit_is_skipped_whole() {
    // Parent plus child needs 1 + 3 tokens; only 3 remain after "a".
    let child = CandidateBuilder::new(Source::Rulebook, "spells.fireball")
        .title("")
        .content("8d6 fire dmg")
        .parent("spells", "", "list")
        .fused(0.8)
        .build();
    let small = CandidateBuilder::new(Source::Rulebook, "rest.short")
        .title("")
        .content("1 hr")
        .fused(0.5)
        .build();
    let first = CandidateBuilder::new(Source::CharacterData, "a")
        .title("")
        .content("abcd")
        .fused(0.9)
        .build();

    let ctx = ContextAssembler::new().assemble(
        by_source(vec![child, small, first]),
        Budget {
            max_items: None,
            max_tokens: Some(4),
        },
    );

    assert_eq!(ids(&ctx), vec!["a", "rest.short"]);
    assert!(ctx.entries.iter().all(|e| e.inclusion == Inclusion::Matched));
    assert_eq!(ctx.estimated_tokens, 2);
    assert_eq!(ctx.dropped, 1);
}

#[test]
fn test_candidate_already_included_as_parent_is_not_repeated() {
    let child = CandidateBuilder::new(Source::CharacterData, "character.combat.armor_class")
        .content("15")
        .parent("character.combat", "Combat", "AC 15, HP 38")
        .fused(0.9)
        .build();
    let section = CandidateBuilder::new(Source::CharacterData, "character.combat")
        .title("Combat")
        .content("AC 15, HP 38")
        .fused(0.4)
        .build();

    let ctx = ContextAssembler::new().assemble(by_source(vec![section, child]), Budget::unbounded());

    assert_eq!(
        ids(&ctx),
        vec!["character.combat", "character.combat.armor_class"]
    );
    assert_eq!(ctx.entries[0].inclusion, Inclusion::Parent);
    assert_eq!(ctx.dropped, 0);
}

#[test]
fn test_same_item_id_in_two_sources_is_kept_twice() {
    let ctx = ContextAssembler::new().assemble(
        by_source(vec![
            CandidateBuilder::new(Source::Rulebook, "notes").fused(0.6).build(),
            CandidateBuilder::new(Source::SessionNotes, "notes").fused(0.6).build(),
        ]),
        Budget::unbounded(),
    );
    let keys: Vec<(Source, &str)> = ctx
        .entries
        .iter()
        .map(|e| (e.source, e.item_id.as_str()))
        .collect();
    assert_eq!(
        keys,
        vec![(Source::SessionNotes, "notes"), (Source::Rulebook, "notes")]
    );
}

fn spec_strategy() -> impl Strategy<Value = Vec<(usize, f32)>> {
    prop::collection::vec((0usize..200, 0.0f32..1.0), 0..20)
}

fn candidates(specs: &[(usize, f32)]) -> Vec<RetrievalCandidate> {
    let sources = Source::all();
    specs
        .iter()
        .enumerate()
        .map(|(i, &(len, fused))| {
            CandidateBuilder::new(sources[i % sources.len()], &format!("item.{i:02}"))
                .title("")
                .content(&"x".repeat(len))
                .fused(fused)
                .build()
        })
        .collect()
}

fn unit_strategy() -> impl Strategy<Value = Vec<(usize, f32, Option<usize>)>> {
    prop::collection::vec(
        (0usize..120, 0.0f32..1.0, prop::option::of(0usize..3)),
        1..16,
    )
}

/// Candidates sharing a few parent sections per source.
fn units(specs: &[(usize, f32, Option<usize>)]) -> Vec<RetrievalCandidate> {
    let sources = Source::all();
    specs
        .iter()
        .enumerate()
        .map(|(i, &(len, fused, parent))| {
            let builder = CandidateBuilder::new(sources[i % sources.len()], &format!("item.{i:02}"))
                .title("")
                .content(&"x".repeat(len))
                .fused(fused);
            let builder = match parent {
                Some(p) => builder.parent(&format!("section.{p}"), "", &"y".repeat(20 + p * 30)),
                None => builder,
            };
            builder.build()
        })
        .collect()
}

fn keys(ctx: &RankedContext) -> Vec<(Source, String)> {
    ctx.entries
        .iter()
        .map(|e| (e.source, e.item_id.clone()))
        .collect()
}

proptest! {
    #[test]
    fn prop_removing_lowest_ranked_never_grows_context(
        specs in unit_strategy(),
        max_items in prop::option::of(0usize..8),
        max_tokens in prop::option::of(0usize..120),
    ) {
        let budget = Budget { max_items, max_tokens };
        let assembler = ContextAssembler::new();

        let mut ranked = units(&specs);
        ranked.sort_by(compare_ranked);
        let before = assembler.assemble(by_source(ranked.clone()), budget);
        ranked.pop();
        let after = assembler.assemble(by_source(ranked), budget);

        prop_assert!(after.entries.len() <= before.entries.len());
        prop_assert!(after.estimated_tokens <= before.estimated_tokens);
        let before_keys = keys(&before);
        let after_keys = keys(&after);
        prop_assert_eq!(&before_keys[..after_keys.len()], &after_keys[..]);
    }

    #[test]
    fn prop_budget_is_never_exceeded(
        specs in spec_strategy(),
        max_items in prop::option::of(0usize..10),
        max_tokens in prop::option::of(0usize..200),
    ) {
        let originals: HashMap<String, String> = candidates(&specs)
            .into_iter()
            .map(|c| (c.item_id, c.content))
            .collect();
        let budget = Budget { max_items, max_tokens };
        let ctx = ContextAssembler::new().assemble(by_source(candidates(&specs)), budget);

        if let Some(max) = max_items {
            prop_assert!(ctx.entries.len() <= max);
        }
        if let Some(max) = max_tokens {
            prop_assert!(ctx.estimated_tokens <= max);
        }
        let summed: usize = ctx.entries.iter().map(|e| e.estimated_tokens).sum();
        prop_assert_eq!(summed, ctx.estimated_tokens);
        prop_assert_eq!(ctx.entries.len() + ctx.dropped, specs.len());

        // Kept content is whole, never cut to fit.
        for e in &ctx.entries {
            prop_assert_eq!(Some(&e.content), originals.get(&e.item_id));
        }
        for pair in ctx.entries.windows(2) {
            prop_assert!(pair[0].fused_score >= pair[1].fused_score);
        }
    }

    #[test]
    fn prop_unbounded_budget_keeps_everything(specs in spec_strategy()) {
        let ctx = ContextAssembler::new().assemble(by_source(candidates(&specs)), Budget::unbounded());
        prop_assert_eq!(ctx.entries.len(), specs.len());
        prop_assert_eq!(ctx.dropped, 0);
    }
}
