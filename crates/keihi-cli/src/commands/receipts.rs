//! Batch receipt image processing

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use keihi_core::{
    Classifier, ImageIngestor, IngestReport, LedgerStore, OcrClient, PromptLibrary, ReceiptDirs,
    StopSignal,
};
use tracing::{info, warn};

use super::core::{build_classifier, format_yen, load_config, outage_error, persist_records};
use crate::cli::OutputArgs;

/// Classify every pending receipt image and save the ledger
pub async fn cmd_receipts(
    config_path: Option<&Path>,
    pending: Option<&Path>,
    processed: Option<&Path>,
    output: &OutputArgs,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut classifier = build_classifier(&config)?;

    let mut dirs = ReceiptDirs::from_config(&config.receipts);
    if let Some(dir) = pending {
        dirs.pending = dir.to_path_buf();
    }
    if let Some(dir) = processed {
        dirs.processed = dir.to_path_buf();
    }

    let mut prompts = PromptLibrary::new();
    let ocr = OcrClient::from_config(&config, &mut prompts).context("Failed to set up OCR")?;
    let ingestor = ImageIngestor::from_config(&config, dirs, ocr);
    let store = LedgerStore::from_config(&config.ledger);

    let stop = StopSignal::new();
    let on_interrupt = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current receipt");
            on_interrupt.stop();
        }
    });

    let report = process_receipts(
        &ingestor,
        &mut classifier,
        &store,
        output,
        &stop,
        Local::now().naive_local(),
    )
    .await?;

    if report.outage {
        return Err(outage_error(&classifier));
    }
    Ok(())
}

/// Run one batch, persist the records, then archive the saved receipts
///
/// If the ledger cannot be written every receipt stays pending.
pub async fn process_receipts(
    ingestor: &ImageIngestor,
    classifier: &mut Classifier,
    store: &LedgerStore,
    output: &OutputArgs,
    stop: &StopSignal,
    now: NaiveDateTime,
) -> Result<IngestReport> {
    let mut report = ingestor
        .process_directory(classifier, stop)
        .await
        .with_context(|| {
            format!(
                "Failed to process receipts in {}",
                ingestor.dirs().pending.display()
            )
        })?;

    let ledger = persist_records(store, &report.records, output, now).with_context(|| {
        format!(
            "Ledger not saved; {} receipt(s) left in {}",
            report.planned.len(),
            ingestor.dirs().pending.display()
        )
    })?;
    if let Some(path) = &ledger {
        info!(ledger = %path.display(), "Receipt batch saved");
    }

    ingestor.archive_planned(&mut report);
    print_report(&report);
    Ok(report)
}

fn print_report(report: &IngestReport) {
    let valid = report.valid_records().count();
    println!("\n📷 Receipts");
    println!("{}", "─".repeat(60));
    println!("  Classified: {}", report.records.len());
    println!("  Valid:      {}", valid);
    println!("  Archived:   {}", report.archived);
    println!("  Failed:     {}", report.failures.len());

    for record in &report.records {
        let source = record
            .source_image
            .as_deref()
            .map(file_label)
            .unwrap_or_default();
        let mark = if record.is_valid { "✓" } else { "✗" };
        println!(
            "  {} {:<24} {:<10} ¥{:>9}  {}",
            mark,
            source,
            record.category.as_str(),
            format_yen(record.amount),
            record.description
        );
    }

    if !report.failures.is_empty() {
        println!("\n⚠️  Failed receipts (left in pending):");
        for failure in &report.failures {
            println!(
                "  {} [{}] {}",
                file_label(&failure.path.to_string_lossy()),
                failure.stage,
                failure.reason
            );
        }
    }

    if report.stopped {
        println!("\nStopped early; remaining receipts are still pending.");
    }
    if report.outage {
        println!("\n❌ Classification backend unavailable; remaining receipts are still pending.");
    }
    println!();
}

fn file_label(path: &str) -> String {
    PathBuf::from(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
