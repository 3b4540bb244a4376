//! Route a question end to end and print the assembled context.

use anyhow::Result;

use crate::cli::output::{
    format_inclusion, format_predictions, format_score, output_json, print_header, print_hint,
    print_kv, print_table, print_warning, truncate, OutputMode,
};
use crate::init::AppContext;
use crate::models::{KnownNames, SessionContext};
use crate::resolver::ResolutionOutcome;

pub async fn handle_ask(
    ctx: &AppContext,
    question: &str,
    known: KnownNames,
    budget: Option<usize>,
    max_items: Option<usize>,
    mode: OutputMode,
) -> Result<()> {
    let session = SessionContext::new()
        .with_history(ctx.load_history()?)
        .with_known(known);

    let mut limits = ctx.pipeline.default_budget();
    if budget.is_some() {
        limits.max_tokens = budget;
    }
    if max_items.is_some() {
        limits.max_items = max_items;
    }

    // Ctrl-C drops the routing future, which cancels retrieval and skips logging.
    let (context, metadata) = tokio::select! {
        routed = ctx.pipeline.route_with_budget(question, &session, limits) => routed?,
        _ = tokio::signal::ctrl_c() => {
            print_warning("Cancelled");
            return Ok(());
        }
    };

    if mode == OutputMode::Json {
        #[derive(serde::Serialize)]
        struct AskJson<'a, C, M> {
            question: &'a str,
            context: C,
            metadata: M,
        }
        output_json(&AskJson {
            question,
            context: &context,
            metadata: &metadata,
        });
        return Ok(());
    }

    print_header("Routing");
    print_kv("Predictions", &format_predictions(&metadata.predictions));
    if let Some(version) = &metadata.classifier_version {
        print_kv("Classifier", version);
    }
    if metadata.classifier_fallback {
        print_warning("Classifier unavailable; routed to every source");
    }
    if let ResolutionOutcome::Rewritten { text } = &metadata.resolution {
        print_kv("Resolved as", text);
    }
    if !metadata.entities.is_empty() {
        let names: Vec<&str> = metadata.entities.iter().map(|e| e.canonical()).collect();
        print_kv("Entities", &names.join(", "));
    }
    if !metadata.empty_sources.is_empty() {
        let sources: Vec<String> = metadata.empty_sources.iter().map(|s| s.to_string()).collect();
        print_kv("No results from", &sources.join(", "));
    }
    for source in &metadata.timed_out_sources {
        print_warning(&format!("{} timed out", source));
    }
    if let Some(comparison) = &metadata.comparison {
        print_kv(
            &format!("Fallback ({})", comparison.backend),
            &format!(
                "{} [{}]",
                format_predictions(&comparison.predictions),
                if comparison.agrees { "agrees" } else { "differs" }
            ),
        );
    }

    print_header("Context");
    let rows: Vec<Vec<String>> = context
        .entries
        .iter()
        .map(|entry| {
            vec![
                entry.source.to_string(),
                entry.item_id.clone(),
                format_inclusion(entry.inclusion).to_string(),
                format_score(entry.fused_score),
                entry.estimated_tokens.to_string(),
                truncate(&entry.content, 60),
            ]
        })
        .collect();
    print_table(&["Source", "Item", "Kind", "Score", "Tokens", "Content"], rows);

    print_hint(&format!(
        "{} entries, ~{} tokens, {} dropped by budget",
        context.entries.len(),
        context.estimated_tokens,
        context.dropped
    ));
    if let Some(record_id) = &metadata.record_id {
        print_hint(&format!(
            "Rate this routing: lorekeep feedback {} --correct | --incorrect",
            record_id
        ));
    }

    Ok(())
}
