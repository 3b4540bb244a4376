//! Feedback submission and history.

use anyhow::Result;

use crate::cli::output::{
    format_predictions, output_json, print_success, print_table, OutputMode,
};
use crate::init::AppContext;
use crate::models::ToolPrediction;

pub async fn handle_feedback(
    ctx: &AppContext,
    record_id: &str,
    is_correct: bool,
    corrections: &[String],
    notes: Option<String>,
    mode: OutputMode,
) -> Result<()> {
    let corrected = corrections
        .iter()
        .map(|spec| ToolPrediction::parse_spec(spec))
        .collect::<Result<Vec<_>, _>>()?;
    let corrected = (!corrected.is_empty()).then_some(corrected);

    let correction = ctx
        .pipeline
        .submit_feedback(record_id, is_correct, corrected, notes)
        .await?;

    if mode == OutputMode::Json {
        output_json(&correction);
    } else {
        print_success(&format!(
            "Recorded {} feedback for {}",
            if is_correct { "positive" } else { "negative" },
            record_id
        ));
    }
    Ok(())
}

pub async fn handle_history(ctx: &AppContext, limit: usize, mode: OutputMode) -> Result<()> {
    let entries = ctx.pipeline.feedback_history(limit).await?;

    if mode == OutputMode::Json {
        output_json(&entries);
        return Ok(());
    }

    let rows = entries
        .iter()
        .map(|entry| {
            let verdict = match entry.corrections.last() {
                Some(c) if c.is_correct => "correct".to_string(),
                Some(c) => match &c.corrected_predictions {
                    Some(fixed) => format!("wrong, wanted {}", format_predictions(fixed)),
                    None => "wrong".to_string(),
                },
                None => "-".to_string(),
            };
            let agrees = match &entry.record.comparison {
                Some(c) if c.agrees => "yes",
                Some(_) => "no",
                None => "-",
            };
            vec![
                entry.record.id.chars().take(8).collect(),
                entry.record.created_at.format("%Y-%m-%d %H:%M").to_string(),
                entry.record.query.clone(),
                format_predictions(&entry.record.predictions),
                agrees.to_string(),
                verdict,
            ]
        })
        .collect();
    print_table(
        &["Id", "When", "Query", "Predictions", "Fallback agrees", "Feedback"],
        rows,
    );
    Ok(())
}
