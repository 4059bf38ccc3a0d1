//! Expense ledger persistence
//!
//! A ledger is a single sheet: a header row, one numbered row per expense
//! and exactly one total row at the bottom. It is stored as an `.xlsx`
//! workbook with a styled header and total row, `¥#,##0` amounts and column
//! widths sized to the content, or as UTF-8 CSV with a BOM when the path
//! ends in `.csv`. Every write rebuilds the whole file through
//! [`reconcile`] and replaces the old one atomically, so a failed write
//! leaves the previous file untouched.

mod csv_sheet;
mod reconcile;
mod xlsx_sheet;

pub use reconcile::{reconcile, ReconciledLedger, SheetRow};

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::models::{ExpenseRecord, MAX_AMOUNT};

/// Column names, in file order
pub const HEADER: [&str; 9] = [
    "sequence",
    "date",
    "category",
    "sub_category",
    "amount",
    "description",
    "purpose",
    "notes",
    "source_image",
];

/// Label written to the description column of the total row
pub const TOTAL_LABEL: &str = "合計";

/// Rows at or above this amount are listed in the summary
pub const HIGH_VALUE_THRESHOLD: u64 = 5_000;

const AMOUNT_COLUMN: usize = 4;
const DESCRIPTION_COLUMN: usize = 5;
const UTF8_BOM: &str = "\u{feff}";

/// On-disk ledger format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LedgerFormat {
    #[default]
    Xlsx,
    Csv,
}

impl LedgerFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }

    /// Format implied by a file name; anything but `.csv` is a workbook
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Xlsx,
        }
    }
}

impl FromStr for LedgerFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "csv" => Ok(Self::Csv),
            other => Err(format!("Unknown ledger format: {} (expected xlsx or csv)", other)),
        }
    }
}

/// One expense as stored in the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub date: String,
    pub category: String,
    pub sub_category: String,
    pub amount: u64,
    pub description: String,
    pub purpose: String,
    pub notes: String,
    pub source_image: String,
}

impl From<&ExpenseRecord> for LedgerEntry {
    fn from(record: &ExpenseRecord) -> Self {
        Self {
            date: record.date.format("%Y-%m-%d").to_string(),
            category: record.category.as_str().to_string(),
            sub_category: record.sub_category.clone().unwrap_or_default(),
            amount: record.amount,
            description: record.description.clone(),
            purpose: record.purpose.as_str().to_string(),
            notes: record.notes.clone(),
            source_image: record.source_image.clone().unwrap_or_default(),
        }
    }
}

/// A data row with its display sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRow {
    pub sequence: u32,
    #[serde(flatten)]
    pub entry: LedgerEntry,
}

impl LedgerRow {
    /// Cells as stored, amount as plain digits
    fn cells(&self) -> [String; 9] {
        let e = &self.entry;
        [
            self.sequence.to_string(),
            e.date.clone(),
            e.category.clone(),
            e.sub_category.clone(),
            e.amount.to_string(),
            e.description.clone(),
            e.purpose.clone(),
            e.notes.clone(),
            e.source_image.clone(),
        ]
    }

    /// Cells as a reader sees them, amount as `¥1,500`
    fn display_cells(&self) -> [String; 9] {
        let mut cells = self.cells();
        cells[AMOUNT_COLUMN] = format!("¥{}", group_thousands(self.entry.amount));
        cells
    }
}

fn total_cells(total: u64) -> [String; 9] {
    let mut cells: [String; 9] = Default::default();
    cells[AMOUNT_COLUMN] = total.to_string();
    cells[DESCRIPTION_COLUMN] = TOTAL_LABEL.to_string();
    cells
}

fn total_display_cells(total: u64) -> [String; 9] {
    let mut cells = total_cells(total);
    cells[AMOUNT_COLUMN] = format!("¥{}", group_thousands(total));
    cells
}

/// A ledger file as read back for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTable {
    pub rows: Vec<LedgerRow>,
    /// Total row as stored (`None` if the file has none)
    pub total: Option<u64>,
    pub blank_rows: usize,
}

/// Writes and appends ledger files
#[derive(Debug, Clone)]
pub struct LedgerStore {
    output_dir: PathBuf,
    file_prefix: String,
    format: LedgerFormat,
}

impl LedgerStore {
    pub fn new(output_dir: impl Into<PathBuf>, file_prefix: &str) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_prefix: file_prefix.to_string(),
            format: LedgerFormat::default(),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.output_dir.clone(), &config.file_prefix).with_format(config.format)
    }

    /// Format used by [`LedgerStore::default_location`]
    pub fn with_format(mut self, format: LedgerFormat) -> Self {
        self.format = format;
        self
    }

    /// `<output_dir>/<prefix>_YYYYMMDD_HHMMSS.<xlsx|csv>`
    pub fn default_location(&self, now: NaiveDateTime) -> PathBuf {
        self.output_dir.join(format!(
            "{}_{}.{}",
            self.file_prefix,
            now.format("%Y%m%d_%H%M%S"),
            self.format.extension()
        ))
    }

    /// Create a fresh ledger at `location`, replacing any existing file
    pub fn write(&self, records: &[ExpenseRecord], location: &Path) -> Result<PathBuf> {
        let ledger = reconcile(Vec::new(), entries(records))?;
        persist(&ledger, location)?;
        info!(
            path = %location.display(),
            rows = ledger.rows.len(),
            total = ledger.total,
            "Ledger written"
        );
        Ok(location.to_path_buf())
    }

    /// Add records to the ledger at `location`, renumbering and re-totalling
    ///
    /// A missing file is created as by [`LedgerStore::write`]. If the
    /// existing file cannot be read it is left as it is.
    pub fn append(&self, records: &[ExpenseRecord], location: &Path) -> Result<PathBuf> {
        if !location.exists() {
            debug!(path = %location.display(), "Ledger missing, creating it");
            return self.write(records, location);
        }

        let existing = read_sheet(location)?;
        let blanks = existing.iter().filter(|r| **r == SheetRow::Blank).count();
        let ledger = reconcile(existing, entries(records))?;
        persist(&ledger, location)?;
        info!(
            path = %location.display(),
            added = records.len(),
            removed_blank = blanks,
            rows = ledger.rows.len(),
            total = ledger.total,
            "Ledger appended"
        );
        Ok(location.to_path_buf())
    }
}

fn entries(records: &[ExpenseRecord]) -> Vec<LedgerEntry> {
    records.iter().map(LedgerEntry::from).collect()
}

/// Serialize the whole sheet to a temp file next to `location`, then rename
fn persist(ledger: &ReconciledLedger, location: &Path) -> Result<()> {
    let body = match LedgerFormat::from_path(location) {
        LedgerFormat::Xlsx => {
            let widths = sheet_widths(&ledger.rows, Some(ledger.total));
            xlsx_sheet::encode(ledger, &widths)?
        }
        LedgerFormat::Csv => csv_sheet::encode(ledger)?,
    };

    let parent = match location.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| {
        Error::Ledger(format!("cannot create {}: {}", parent.display(), e))
    })?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| {
        Error::Ledger(format!("cannot write to {}: {}", parent.display(), e))
    })?;
    tmp.write_all(&body)?;
    tmp.flush()?;
    tmp.persist(location).map_err(|e| {
        Error::Ledger(format!("cannot replace {}: {}", location.display(), e.error))
    })?;
    Ok(())
}

fn read_sheet(location: &Path) -> Result<Vec<SheetRow>> {
    let mut rows = match LedgerFormat::from_path(location) {
        LedgerFormat::Xlsx => xlsx_sheet::decode(location)?,
        LedgerFormat::Csv => csv_sheet::decode(location)?,
    }
    .into_iter();

    let header = rows.next().unwrap_or_default();
    let used = header
        .iter()
        .rposition(|c| !c.trim().is_empty())
        .map_or(0, |i| i + 1);
    if header[..used].iter().map(|c| c.trim()).ne(HEADER.iter().copied()) {
        return Err(Error::Ledger(format!(
            "{} is not a ledger (unexpected header)",
            location.display()
        )));
    }

    // header is line 1
    rows.enumerate()
        .map(|(i, cells)| sheet_row(&cells, i + 2))
        .collect()
}

fn sheet_row(cells: &[String], line: usize) -> Result<SheetRow> {
    let cell = |i: usize| cells.get(i).map(|c| c.trim()).unwrap_or("");

    // a leftover sequence number alone does not make a row
    if (1..HEADER.len()).all(|i| cell(i).is_empty()) {
        return Ok(SheetRow::Blank);
    }

    let amount = match cell(AMOUNT_COLUMN) {
        "" => 0,
        raw => raw
            .trim_start_matches('¥')
            .replace(',', "")
            .parse::<u64>()
            .ok()
            .filter(|v| *v <= MAX_AMOUNT)
            .ok_or_else(|| Error::Ledger(format!("line {}: invalid amount {:?}", line, raw)))?,
    };

    if cell(0).is_empty() && cell(DESCRIPTION_COLUMN) == TOTAL_LABEL {
        return Ok(SheetRow::Total(amount));
    }

    Ok(SheetRow::Data(LedgerEntry {
        date: cell(1).to_string(),
        category: cell(2).to_string(),
        sub_category: cell(3).to_string(),
        amount,
        description: cell(DESCRIPTION_COLUMN).to_string(),
        purpose: cell(6).to_string(),
        notes: cell(7).to_string(),
        source_image: cell(8).to_string(),
    }))
}

/// Read a ledger as stored, without renumbering
pub fn load(location: &Path) -> Result<LedgerTable> {
    if !location.exists() {
        return Err(Error::NotFound(location.display().to_string()));
    }

    let mut rows = Vec::new();
    let mut total = None;
    let mut blank_rows = 0;
    let mut sequence = 0;

    for row in read_sheet(location)? {
        match row {
            SheetRow::Data(entry) => {
                sequence += 1;
                rows.push(LedgerRow { sequence, entry });
            }
            SheetRow::Total(t) => total = Some(t),
            SheetRow::Blank => blank_rows += 1,
        }
    }

    Ok(LedgerTable {
        rows,
        total,
        blank_rows,
    })
}

/// Totals for one ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub total: u64,
    pub by_category: BTreeMap<String, u64>,
    /// Rows at or above [`HIGH_VALUE_THRESHOLD`]
    pub high_value: Vec<LedgerRow>,
}

pub fn summarize(rows: &[LedgerRow]) -> Result<LedgerSummary> {
    let overflow = || Error::Ledger("ledger total exceeds the representable range".into());

    let mut total = 0u64;
    let mut by_category = BTreeMap::new();
    for row in rows {
        let amount = row.entry.amount;
        total = total.checked_add(amount).ok_or_else(overflow)?;
        let sum = by_category.entry(row.entry.category.clone()).or_insert(0u64);
        *sum = sum.checked_add(amount).ok_or_else(overflow)?;
    }

    Ok(LedgerSummary {
        total,
        by_category,
        high_value: rows
            .iter()
            .filter(|r| r.entry.amount >= HIGH_VALUE_THRESHOLD)
            .cloned()
            .collect(),
    })
}

/// `1234567` → `1,234,567`
pub fn group_thousands(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Terminal columns occupied by `s`; East Asian wide characters count 2
pub fn display_width(s: &str) -> usize {
    s.chars().map(|c| if is_wide(c) { 2 } else { 1 }).sum()
}

fn is_wide(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x115F
        | 0x2E80..=0x303E
        | 0x3041..=0x33FF
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xA000..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x1F300..=0x1F64F
        | 0x1F900..=0x1F9FF
        | 0x20000..=0x3FFFD)
}

/// Width of each column: widest rendered cell plus padding, clamped to 8..=50
pub fn column_widths(table: &LedgerTable) -> [usize; 9] {
    sheet_widths(&table.rows, table.total)
}

fn sheet_widths(rows: &[LedgerRow], total: Option<u64>) -> [usize; 9] {
    let mut widths = HEADER.map(display_width);
    let total = total.map(total_display_cells);

    for cells in rows.iter().map(LedgerRow::display_cells).chain(total) {
        for (w, cell) in widths.iter_mut().zip(cells.iter()) {
            *w = (*w).max(display_width(cell));
        }
    }

    widths.map(|w| (w + 2).clamp(8, 50))
}

/// Pad or cut `s` to exactly `width` display columns
fn fit(s: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = if is_wide(c) { 2 } else { 1 };
        if used + w > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push_str(&" ".repeat(width - used));
    out
}

/// Render the table column-aligned for a terminal
pub fn render(table: &LedgerTable) -> String {
    let widths = column_widths(table);
    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(c, w)| fit(c, *w))
            .collect::<String>()
            .trim_end()
            .to_string()
    };

    let mut out = Vec::new();
    out.push(line(&HEADER.map(str::to_string)));
    for row in &table.rows {
        out.push(line(&row.display_cells()));
    }
    if let Some(total) = table.total {
        out.push(line(&total_display_cells(total)));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Purpose};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(amount: u64, description: &str) -> ExpenseRecord {
        ExpenseRecord {
            category: Category::Transport,
            sub_category: Some("タクシー".to_string()),
            amount,
            date: NaiveDate::from_ymd_opt(2024, 3, 13).unwrap(),
            description: description.to_string(),
            purpose: Purpose::Business,
            is_valid: true,
            notes: String::new(),
            source_image: None,
        }
    }

    fn store(dir: &TempDir) -> LedgerStore {
        LedgerStore::new(dir.path(), "expense_report")
    }

    #[test]
    fn test_write_empty_has_header_and_zero_total() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        store(&dir).write(&[], &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(UTF8_BOM));
        let lines: Vec<&str> = content.trim_start_matches(UTF8_BOM).lines().collect();
        assert_eq!(lines[0], HEADER.join(","));
        assert_eq!(lines.len(), 2);

        let table = load(&path).unwrap();
        assert!(table.rows.is_empty());
        assert_eq!(table.total, Some(0));
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out/ledger.csv");
        let records = vec![record(1500, "タクシー代, 深夜"), record(2800, "ランチ")];
        store(&dir).write(&records, &path).unwrap();

        let table = load(&path).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].sequence, 1);
        assert_eq!(table.rows[0].entry.description, "タクシー代, 深夜");
        assert_eq!(table.rows[1].entry.category, "交通費");
        assert_eq!(table.total, Some(4300));
    }

    #[test]
    fn test_append_to_missing_file_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.csv");
        store(&dir).append(&[record(500, "バス")], &path).unwrap();
        assert_eq!(load(&path).unwrap().total, Some(500));
    }

    #[test]
    fn test_append_removes_blank_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.csv");
        let content = format!(
            "{}{}\n1,2024-03-01,交通費,,100,電車,business,,\n,,,,,,,,\n2,2024-03-02,飲食費,,200,ランチ,unknown,,\n,,,,,,,,\n,,,,300,合計,,,\n",
            UTF8_BOM,
            HEADER.join(",")
        );
        fs::write(&path, content).unwrap();
        assert_eq!(load(&path).unwrap().blank_rows, 2);

        store(&dir).append(&[record(50, "バス")], &path).unwrap();

        let table = load(&path).unwrap();
        assert_eq!(table.blank_rows, 0);
        let seqs: Vec<u32> = table.rows.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(table.total, Some(350));

        let totals = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .filter(|l| l.contains(TOTAL_LABEL))
            .count();
        assert_eq!(totals, 1);
    }

    #[test]
    fn test_unparsable_amount_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        let content = format!("{}\n1,2024-03-01,交通費,,百円,電車,business,,\n", HEADER.join(","));
        fs::write(&path, &content).unwrap();

        let err = store(&dir).append(&[record(1, "x")], &path).unwrap_err();
        assert!(matches!(err, Error::Ledger(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_foreign_csv_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.csv");
        fs::write(&path, "a,b,c\n1,2,3\n").unwrap();
        assert!(matches!(load(&path), Err(Error::Ledger(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_location_is_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        let path = blocker.join("ledger.csv");
        assert!(store(&dir).write(&[record(1, "x")], &path).is_err());
    }

    #[test]
    fn test_default_location() {
        let store = LedgerStore::new("/tmp/out", "expense_report");
        let now = NaiveDate::from_ymd_opt(2024, 3, 13)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap();
        assert_eq!(
            store.default_location(now),
            PathBuf::from("/tmp/out/expense_report_20240313_090507.xlsx")
        );
        assert_eq!(
            store.with_format(LedgerFormat::Csv).default_location(now),
            PathBuf::from("/tmp/out/expense_report_20240313_090507.csv")
        );
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(LedgerFormat::from_path(Path::new("a.CSV")), LedgerFormat::Csv);
        assert_eq!(LedgerFormat::from_path(Path::new("a.xlsx")), LedgerFormat::Xlsx);
        assert_eq!(LedgerFormat::from_path(Path::new("ledger")), LedgerFormat::Xlsx);
        assert_eq!("CSV".parse::<LedgerFormat>(), Ok(LedgerFormat::Csv));
        assert!("ods".parse::<LedgerFormat>().is_err());
    }

    #[test]
    fn test_sequence_only_row_is_blank() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leftover.csv");
        let content = format!(
            "{}\n1,2024-03-01,交通費,,100,電車,business,,\n2,,,,,,,,\n7\n,,,,100,合計,,,\n",
            HEADER.join(",")
        );
        fs::write(&path, content).unwrap();

        let table = load(&path).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.blank_rows, 2);

        store(&dir).append(&[record(50, "バス")], &path).unwrap();
        let table = load(&path).unwrap();
        let amounts: Vec<u64> = table.rows.iter().map(|r| r.entry.amount).collect();
        assert_eq!(amounts, vec![100, 50]);
        assert_eq!(table.total, Some(150));
    }

    #[test]
    fn test_oversized_amount_in_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("huge.csv");
        let content = format!(
            "{}\n1,2024-03-01,交通費,,18446744073709551615,電車,business,,\n",
            HEADER.join(",")
        );
        fs::write(&path, &content).unwrap();

        assert!(matches!(load(&path), Err(Error::Ledger(_))));
        assert!(store(&dir).append(&[record(1, "x")], &path).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_xlsx_write_then_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.xlsx");
        let records = vec![record(1500, "タクシー代, 深夜"), record(2800, "ランチ")];
        store(&dir).write(&records, &path).unwrap();
        assert!(fs::read(&path).unwrap().starts_with(b"PK"));

        let table = load(&path).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].sequence, 1);
        assert_eq!(table.rows[0].entry.description, "タクシー代, 深夜");
        assert_eq!(table.rows[0].entry.amount, 1500);
        assert_eq!(table.rows[0].entry.date, "2024-03-13");
        assert_eq!(table.rows[1].entry.sub_category, "タクシー");
        assert_eq!(table.total, Some(4300));

        store(&dir).append(&[record(15000, "新幹線")], &path).unwrap();
        let table = load(&path).unwrap();
        let seqs: Vec<u32> = table.rows.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(table.total, Some(19300));
        assert_eq!(table.blank_rows, 0);
    }

    #[test]
    fn test_xlsx_hand_edited_rows_removed() {
        use rust_xlsxwriter::Workbook;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edited.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, name) in HEADER.iter().enumerate() {
            sheet.write_string(0, col as u16, *name).unwrap();
        }
        sheet.write_number(1, 0, 1).unwrap();
        sheet.write_string(1, 1, "2024-03-01").unwrap();
        sheet.write_string(1, 2, "交通費").unwrap();
        sheet.write_number(1, 4, 100).unwrap();
        sheet.write_string(1, 5, "電車").unwrap();
        // row 2 left empty, row 3 keeps only its old sequence number
        sheet.write_number(3, 0, 3).unwrap();
        sheet.write_number(4, 0, 4).unwrap();
        sheet.write_string(4, 2, "飲食費").unwrap();
        sheet.write_number(4, 4, 200).unwrap();
        sheet.write_number(5, 4, 999).unwrap();
        sheet.write_string(5, 5, TOTAL_LABEL).unwrap();
        workbook.save(&path).unwrap();

        let table = load(&path).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.blank_rows, 2);
        assert_eq!(table.total, Some(999));

        store(&dir).append(&[record(50, "バス")], &path).unwrap();
        let table = load(&path).unwrap();
        let seqs: Vec<u32> = table.rows.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(table.blank_rows, 0);
        assert_eq!(table.total, Some(350));
    }

    #[test]
    fn test_xlsx_corrupt_file_left_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.xlsx");
        fs::write(&path, b"not a zip archive").unwrap();

        assert!(matches!(load(&path), Err(Error::Ledger(_))));
        assert!(store(&dir).append(&[record(1, "x")], &path).is_err());
        assert_eq!(fs::read(&path).unwrap(), b"not a zip archive");
    }

    #[test]
    fn test_sheet_widths_use_rendered_amounts() {
        let rows = vec![LedgerRow {
            sequence: 1,
            entry: LedgerEntry::from(&record(123_456_789, "x")),
        }];
        let widths = sheet_widths(&rows, Some(123_456_789));
        // "¥123,456,789" is 12 columns
        assert_eq!(widths[AMOUNT_COLUMN], 14);
        assert_eq!(widths[DESCRIPTION_COLUMN], 13); // "description" + 2
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1500), "1,500");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_display_width() {
        assert_eq!(display_width("abc"), 3);
        assert_eq!(display_width("交通費"), 6);
        assert_eq!(display_width("ﾀｸｼｰ"), 4);
        assert_eq!(display_width("ＡＢ"), 4);
    }

    #[test]
    fn test_column_widths_clamped() {
        let mut long = record(1, &"長".repeat(40));
        long.notes = "n".repeat(3);
        let table = LedgerTable {
            rows: vec![LedgerRow {
                sequence: 1,
                entry: LedgerEntry::from(&long),
            }],
            total: Some(1),
            blank_rows: 0,
        };
        let widths = column_widths(&table);
        assert_eq!(widths[0], 10); // "sequence" + 2
        assert_eq!(widths[2], 10); // header "category" is wider than "交通費"
        assert_eq!(widths[3], 14); // "sub_category"
        assert_eq!(widths[4], 8);
        assert_eq!(widths[5], 50);
        assert_eq!(render(&table).lines().count(), 3);
    }

    #[test]
    fn test_summarize() {
        let rows: Vec<LedgerRow> = [1500u64, 2800, 15000]
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let mut r = record(*a, "x");
                if *a == 2800 {
                    r.category = Category::Meals;
                }
                LedgerRow {
                    sequence: i as u32 + 1,
                    entry: LedgerEntry::from(&r),
                }
            })
            .collect();

        let summary = summarize(&rows).unwrap();
        assert_eq!(summary.total, 19300);
        assert_eq!(summary.by_category["交通費"], 16500);
        assert_eq!(summary.by_category["飲食費"], 2800);
        assert_eq!(summary.high_value.len(), 1);
        assert_eq!(summary.high_value[0].entry.amount, 15000);
    }

    #[test]
    fn test_summarize_overflow_is_error() {
        let rows: Vec<LedgerRow> = [u64::MAX, 1]
            .iter()
            .enumerate()
            .map(|(i, a)| LedgerRow {
                sequence: i as u32 + 1,
                entry: LedgerEntry::from(&record(*a, "x")),
            })
            .collect();
        assert!(matches!(summarize(&rows), Err(Error::Ledger(_))));
    }
}
