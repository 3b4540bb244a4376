//! Lorekeep - query routing and context assembly for tabletop sessions
//!
//! Usage:
//!   lorekeep ask "What's my AC?"          Route a question, print context
//!   lorekeep classify "Cast fireball"     Show classifier predictions
//!   lorekeep entities "Where is Kara?"    Show recognized entities
//!   lorekeep feedback <id> --incorrect    Correct a logged routing
//!   lorekeep history                      Recent routing decisions
//!   lorekeep --help                       Show all commands

use anyhow::Result;
use clap::Parser;

use lorekeep::cli::output::OutputMode;
use lorekeep::cli::{print_completions, Cli, Commands};
use lorekeep::init::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing to stderr so --json output stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lorekeep=info".parse()?),
        )
        .init();

    let mode = OutputMode::from_json_flag(cli.json);

    match &cli.command {
        Commands::Completions { shell } => print_completions(*shell),
        cmd => {
            let ctx = AppContext::init(cli.data_path.clone()).await?;
            let result = lorekeep::cli::execute(cmd, &ctx, mode).await;
            ctx.shutdown().await?;
            result?;
        }
    }

    Ok(())
}
