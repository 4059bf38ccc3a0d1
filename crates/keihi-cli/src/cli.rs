//! CLI argument definitions using clap
//!
//! The command implementations live in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Keihi - Turn expense entries and receipt photos into a ledger
#[derive(Parser)]
#[command(name = "keihi")]
#[command(about = "Classify expenses and keep an expense ledger (xlsx or csv)", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to the data-dir config, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Type expenses one per line and classify them
    Interactive {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Classify every receipt image in the pending directory
    Receipts {
        /// Directory holding unprocessed receipt images
        #[arg(long)]
        pending: Option<PathBuf>,

        /// Directory receipts are moved to once classified
        #[arg(long)]
        processed: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Ledger file commands
    #[command(subcommand)]
    Ledger(LedgerCommands),

    /// Check the classification backend and OCR engine
    Check,

    /// Prompt library commands
    #[command(subcommand)]
    Prompts(PromptsCommands),
}

/// Where and how classified records are persisted
#[derive(clap::Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Ledger file to write (defaults to a timestamped file in the output dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Append to the ledger instead of replacing it
    #[arg(short, long)]
    pub append: bool,

    /// Also write records that failed classification
    #[arg(long)]
    pub include_errors: bool,
}

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Print a ledger file with aligned columns and a summary
    Show {
        /// Ledger file (.xlsx or .csv)
        path: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum PromptsCommands {
    /// List prompts and their override status
    List,
}
