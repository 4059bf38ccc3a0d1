//! Ledger inspection

use std::path::Path;

use anyhow::{Context, Result};
use keihi_core::ledger::{load, render, summarize, HIGH_VALUE_THRESHOLD};

use super::core::format_yen;

/// Print a ledger with aligned columns followed by its totals
pub fn cmd_ledger_show(path: &Path) -> Result<()> {
    let table = load(path).with_context(|| format!("Failed to read ledger {}", path.display()))?;

    if table.rows.is_empty() {
        println!("Ledger {} has no entries", path.display());
        return Ok(());
    }

    println!("{}\n", render(&table));

    let summary = summarize(&table.rows)
        .with_context(|| format!("Failed to total ledger {}", path.display()))?;
    println!("By category:");
    for (category, amount) in &summary.by_category {
        println!("  {:<12} ¥{:>10}", category, format_yen(*amount));
    }

    if !summary.high_value.is_empty() {
        println!(
            "\nItems of ¥{} or more:",
            format_yen(HIGH_VALUE_THRESHOLD)
        );
        for row in &summary.high_value {
            println!(
                "  #{:<4} {} ¥{} {}",
                row.sequence,
                row.entry.date,
                format_yen(row.entry.amount),
                row.entry.description
            );
        }
    }

    println!("\nTotal: ¥{}", format_yen(summary.total));
    if table.total != Some(summary.total) {
        println!("⚠️  Stored total row does not match the entries; append to rewrite it.");
    }
    if table.blank_rows > 0 {
        println!("⚠️  {} blank row(s) will be removed on the next append.", table.blank_rows);
    }
    Ok(())
}
