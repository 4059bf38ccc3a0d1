//! Row numbering and total recomputation, separated from file I/O

use super::{LedgerEntry, LedgerRow};
use crate::error::{Error, Result};

/// A row as read back from an existing ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetRow {
    Data(LedgerEntry),
    Total(u64),
    /// No value in any column after the sequence number
    Blank,
}

/// Numbered data rows plus the single total that belongs under them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledLedger {
    pub rows: Vec<LedgerRow>,
    pub total: u64,
}

/// Merge existing rows with new entries
///
/// Blank rows and any previous total rows are dropped, the surviving data
/// rows keep their order and are followed by `new`, sequence numbers run
/// 1..=N and the total is summed from scratch. A total that does not fit in
/// `u64` is an error.
pub fn reconcile(existing: Vec<SheetRow>, new: Vec<LedgerEntry>) -> Result<ReconciledLedger> {
    let kept = existing.into_iter().filter_map(|row| match row {
        SheetRow::Data(entry) => Some(entry),
        SheetRow::Total(_) | SheetRow::Blank => None,
    });

    let rows: Vec<LedgerRow> = kept
        .chain(new)
        .enumerate()
        .map(|(i, entry)| LedgerRow {
            sequence: i as u32 + 1,
            entry,
        })
        .collect();

    let total = rows
        .iter()
        .try_fold(0u64, |sum, r| sum.checked_add(r.entry.amount))
        .ok_or_else(|| Error::Ledger("ledger total exceeds the representable range".into()))?;

    Ok(ReconciledLedger { rows, total })
}
