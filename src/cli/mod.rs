//! CLI interface for Lorekeep.

pub mod handlers;
pub mod output;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use output::OutputMode;

/// Lorekeep - query routing and context assembly for tabletop sessions
#[derive(Parser)]
#[command(name = "lorekeep", version, about, long_about = None)]
pub struct Cli {
    /// Override data directory (default: ~/.lorekeep)
    #[arg(long, env = "LOREKEEP_DATA_PATH", global = true)]
    pub data_path: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Route a question and print the assembled context
    Ask {
        /// The question to ask
        question: String,
        /// Active character's name
        #[arg(long)]
        character: Option<String>,
        /// Party members (comma-separated)
        #[arg(long, value_delimiter = ',')]
        party: Vec<String>,
        /// Known NPCs (comma-separated)
        #[arg(long = "npc", value_delimiter = ',')]
        npcs: Vec<String>,
        /// Token budget for the assembled context
        #[arg(long)]
        budget: Option<usize>,
        /// Maximum context entries
        #[arg(long)]
        max_items: Option<usize>,
    },

    /// Show classifier predictions for a question
    Classify {
        question: String,
        /// Active character's name
        #[arg(long)]
        character: Option<String>,
    },

    /// Show recognized entities and the placeholder-normalized text
    Entities {
        question: String,
        /// Active character's name
        #[arg(long)]
        character: Option<String>,
    },

    /// Record a correction against a logged routing decision
    Feedback {
        /// Record id printed by `ask`
        record_id: String,
        /// The routing was correct
        #[arg(long, conflicts_with = "incorrect", required_unless_present = "incorrect")]
        correct: bool,
        /// The routing was wrong
        #[arg(long)]
        incorrect: bool,
        /// Correct prediction as source:intent (repeatable)
        #[arg(long = "correction", action = clap::ArgAction::Append)]
        corrections: Vec<String>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// List recent routing decisions and their corrections
    History {
        /// Maximum records
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        shell: clap_complete::Shell,
    },
}

/// Execute a CLI command, dispatching to the appropriate handler.
pub async fn execute(
    command: &Commands,
    ctx: &crate::init::AppContext,
    mode: OutputMode,
) -> anyhow::Result<()> {
    match command {
        Commands::Ask {
            question,
            character,
            party,
            npcs,
            budget,
            max_items,
        } => {
            let known = handlers::known_names(character.as_deref(), party, npcs);
            handlers::ask::handle_ask(ctx, question, known, *budget, *max_items, mode).await?
        }
        Commands::Classify {
            question,
            character,
        } => {
            let known = handlers::known_names(character.as_deref(), &[], &[]);
            handlers::inspect::handle_classify(ctx, question, &known, mode).await?
        }
        Commands::Entities {
            question,
            character,
        } => {
            let known = handlers::known_names(character.as_deref(), &[], &[]);
            handlers::inspect::handle_entities(ctx, question, &known, mode)?
        }
        Commands::Feedback {
            record_id,
            correct,
            incorrect: _,
            corrections,
            notes,
        } => {
            handlers::feedback::handle_feedback(
                ctx,
                record_id,
                *correct,
                corrections,
                notes.clone(),
                mode,
            )
            .await?
        }
        Commands::History { limit } => {
            handlers::feedback::handle_history(ctx, *limit, mode).await?
        }
        Commands::Completions { .. } => unreachable!("completions handled in main"),
    }

    Ok(())
}

/// Write completions for `shell` to stdout. Needs no data directory.
pub fn print_completions(shell: clap_complete::Shell) {
    clap_complete::generate(shell, &mut Cli::command(), "lorekeep", &mut std::io::stdout());
}
