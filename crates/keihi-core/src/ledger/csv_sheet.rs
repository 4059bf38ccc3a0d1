//! CSV encoding of a ledger sheet

use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use super::{total_cells, ReconciledLedger, HEADER, UTF8_BOM};
use crate::error::{Error, Result};

/// BOM, header, numbered rows, total row
pub(super) fn encode(ledger: &ReconciledLedger) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(UTF8_BOM.as_bytes().to_vec());
    writer.write_record(HEADER)?;
    for row in &ledger.rows {
        writer.write_record(row.cells())?;
    }
    writer.write_record(total_cells(ledger.total))?;
    writer
        .into_inner()
        .map_err(|e| Error::Ledger(format!("failed to serialize ledger: {}", e)))
}

/// Every record of the file, header first
pub(super) fn decode(location: &Path) -> Result<Vec<Vec<String>>> {
    let content = fs::read_to_string(location)?;
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(&content);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}
