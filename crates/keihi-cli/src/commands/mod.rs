//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (config loading, classifier setup, ledger output)
//! - `check` - Backend and OCR availability check
//! - `interactive` - Line-by-line expense entry
//! - `ledger` - Ledger file inspection
//! - `prompts` - Prompt library listing
//! - `receipts` - Batch receipt image processing

pub mod check;
pub mod core;
pub mod interactive;
pub mod ledger;
pub mod prompts;
pub mod receipts;

// Re-export command functions for main.rs
pub use check::*;
pub use core::*;
pub use interactive::*;
pub use ledger::*;
pub use prompts::*;
pub use receipts::*;
