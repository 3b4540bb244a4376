//! Output formatting for CLI commands.

use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::models::{Inclusion, ToolPrediction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

/// Print a value as pretty-printed JSON.
pub fn output_json<T: Serialize + ?Sized>(item: &T) {
    match serde_json::to_string_pretty(item) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("Failed to serialize to JSON: {}", e)),
    }
}

/// Print a formatted table with headers and rows.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        println!("{}", "No results found.".dimmed());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(headers);

    for row in rows {
        table.add_row(row);
    }

    println!("{table}");
}

pub fn print_success(msg: &str) {
    println!("{} {}", "OK".green().bold(), msg);
}

/// Print an error message to stderr.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "Error:".red().bold(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "Warning:".yellow().bold(), msg);
}

pub fn print_header(title: &str) {
    println!("\n{}\n", title.bold());
}

pub fn print_kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

pub fn print_hint(msg: &str) {
    println!("{}", msg.dimmed());
}

pub fn format_score(score: f32) -> String {
    format!("{:.3}", score)
}

/// `source:intent (confidence)` list, comma-separated.
pub fn format_predictions(predictions: &[ToolPrediction]) -> String {
    if predictions.is_empty() {
        return "(none)".to_string();
    }
    predictions
        .iter()
        .map(|p| format!("{}:{} ({})", p.source, p.intent, format_score(p.confidence)))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_inclusion(inclusion: Inclusion) -> &'static str {
    match inclusion {
        Inclusion::Matched => "match",
        Inclusion::Parent => "parent",
    }
}

/// Shorten `text` to at most `max` characters, on a char boundary.
pub fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let cut: String = single_line.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 40), "line one line two");
        assert_eq!(truncate("Élan vital", 4), "Éla…");
    }

    #[test]
    fn test_format_predictions() {
        assert_eq!(format_predictions(&[]), "(none)");
        let predictions = vec![ToolPrediction::new(Source::Rulebook, "spell_details", 0.8)];
        assert_eq!(format_predictions(&predictions), "rulebook:spell_details (0.800)");
    }
}
