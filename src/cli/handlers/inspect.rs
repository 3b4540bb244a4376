//! Single-stage inspection: entity resolution and classification.

use anyhow::Result;

use crate::cli::output::{
    format_score, output_json, print_header, print_hint, print_kv, print_table, OutputMode,
};
use crate::init::AppContext;
use crate::models::KnownNames;

pub fn handle_entities(
    ctx: &AppContext,
    question: &str,
    known: &KnownNames,
    mode: OutputMode,
) -> Result<()> {
    let normalized = ctx.pipeline.entity_resolver().resolve(question, known)?;

    if mode == OutputMode::Json {
        output_json(&normalized);
        return Ok(());
    }

    print_kv("Normalized", &normalized.text);
    print_header("Entities");
    let rows = normalized
        .entities
        .iter()
        .map(|e| {
            vec![
                e.text.clone(),
                e.entity_type.to_string(),
                format!("{}..{}", e.start, e.end),
                e.resolved.clone().unwrap_or_else(|| "-".to_string()),
                format_score(e.confidence),
            ]
        })
        .collect();
    print_table(&["Text", "Type", "Span", "Canonical", "Confidence"], rows);

    if !normalized.placeholders.is_empty() {
        print_header("Placeholders");
        let rows = normalized
            .placeholders
            .iter()
            .map(|(token, name)| vec![token.clone(), name.clone()])
            .collect();
        print_table(&["Token", "Name"], rows);
    }
    Ok(())
}

pub async fn handle_classify(
    ctx: &AppContext,
    question: &str,
    known: &KnownNames,
    mode: OutputMode,
) -> Result<()> {
    let normalized = ctx.pipeline.entity_resolver().resolve(question, known)?;
    let classifier = ctx.pipeline.classifier();
    let predictions = classifier.classify(&normalized.text).await?;

    if mode == OutputMode::Json {
        #[derive(serde::Serialize)]
        struct ClassifyJson<'a, P> {
            normalized_text: &'a str,
            classifier_version: Option<&'a str>,
            predictions: P,
        }
        output_json(&ClassifyJson {
            normalized_text: &normalized.text,
            classifier_version: classifier.version(),
            predictions: &predictions,
        });
        return Ok(());
    }

    print_kv("Normalized", &normalized.text);
    if let Some(version) = classifier.version() {
        print_kv("Classifier", version);
    }
    if predictions.is_empty() {
        print_hint("No source needed for this question.");
        return Ok(());
    }
    print_header("Predictions");
    let rows = predictions
        .iter()
        .map(|p| vec![p.source.to_string(), p.intent.clone(), format_score(p.confidence)])
        .collect();
    print_table(&["Source", "Intent", "Confidence"], rows);
    Ok(())
}
