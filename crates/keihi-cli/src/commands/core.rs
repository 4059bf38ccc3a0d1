//! Shared command utilities

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use keihi_core::{
    ledger, AIClient, Classifier, Config, Error, ExpenseRecord, LedgerStore, PromptLibrary,
};
use tracing::{info, warn};

use crate::cli::OutputArgs;

/// Load configuration from an explicit path or the default locations
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load(path).context("Failed to load configuration")?;
    if let Some(source) = &config.source {
        info!("Using config {}", source.display());
    }
    Ok(config)
}

/// Build a classifier for the configured backend
pub fn build_classifier(config: &Config) -> Result<Classifier> {
    let ai = AIClient::from_config(&config.ai).context("Failed to set up classification backend")?;
    info!(
        backend = config.ai.backend.as_str(),
        model = %config.ai.model,
        "Classification backend ready"
    );
    Ok(Classifier::new(ai, PromptLibrary::new())
        .with_max_consecutive_failures(config.classification.max_consecutive_failures))
}

/// Records that should land in the ledger
pub fn select_records(records: &[ExpenseRecord], include_errors: bool) -> Vec<ExpenseRecord> {
    records
        .iter()
        .filter(|r| include_errors || r.is_valid)
        .cloned()
        .collect()
}

/// Write or append records to the chosen ledger
///
/// Returns the ledger path, or `None` when there was nothing to write.
pub fn persist_records(
    store: &LedgerStore,
    records: &[ExpenseRecord],
    output: &OutputArgs,
    now: NaiveDateTime,
) -> Result<Option<PathBuf>> {
    let selected = select_records(records, output.include_errors);
    let skipped = records.len() - selected.len();
    if skipped > 0 {
        warn!("Skipping {} record(s) that failed classification", skipped);
    }
    if selected.is_empty() {
        println!("No records to write.");
        return Ok(None);
    }

    let location = output
        .output
        .clone()
        .unwrap_or_else(|| store.default_location(now));

    let written = if output.append {
        store.append(&selected, &location)
    } else {
        store.write(&selected, &location)
    }
    .with_context(|| format!("Failed to save ledger {}", location.display()))?;

    let total: u64 = selected.iter().map(|r| r.amount).sum();
    println!(
        "✓ Saved {} record(s) (¥{}) to {}",
        selected.len(),
        format_yen(total),
        written.display()
    );
    Ok(Some(written))
}

/// The error returned once records are saved after an outage
pub fn outage_error(classifier: &Classifier) -> anyhow::Error {
    anyhow::Error::new(Error::ServiceOutage {
        consecutive: classifier.consecutive_failures(),
    })
}

/// Format a yen amount with thousands separators
pub fn format_yen(amount: u64) -> String {
    ledger::group_thousands(amount)
}
