//! Keihi CLI - Expense classification and ledger tool
//!
//! Usage:
//!   keihi interactive              Type expenses, write a ledger
//!   keihi receipts --append -o F   Classify receipt images into F
//!   keihi ledger show F            Print a ledger
//!   keihi check                    Check backend and OCR

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --debug flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Interactive { output } => commands::cmd_interactive(config, &output).await,
        Commands::Receipts {
            pending,
            processed,
            output,
        } => {
            commands::cmd_receipts(config, pending.as_deref(), processed.as_deref(), &output).await
        }
        Commands::Ledger(LedgerCommands::Show { path }) => commands::cmd_ledger_show(&path),
        Commands::Check => commands::cmd_check(config).await,
        Commands::Prompts(PromptsCommands::List) => commands::cmd_prompts_list(),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
