//! Excel workbook encoding of a ledger sheet
//!
//! Written with `rust_xlsxwriter`, read back with `calamine`. Only values
//! are read back; styles and widths are recomputed on every write.

use std::path::Path;

use calamine::{open_workbook, Data, DataType, Reader, Xlsx};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};

use super::{ReconciledLedger, AMOUNT_COLUMN, DESCRIPTION_COLUMN, HEADER, TOTAL_LABEL};
use crate::error::{Error, Result};

pub(super) const SHEET_NAME: &str = "経費精算";
const YEN_FORMAT: &str = "¥#,##0";

const HEADER_FILL: u32 = 0xDDEBF7;
const STRIPE_FILL: u32 = 0xF5F5F5;
const TOTAL_FILL: u32 = 0xFFC000;

struct Styles {
    header: Format,
    /// Plain and striped data cells
    text: [Format; 2],
    amount: [Format; 2],
    total_label: Format,
    total_amount: Format,
}

impl Styles {
    fn new() -> Self {
        let plain = Format::new()
            .set_border(FormatBorder::Thin)
            .set_align(FormatAlign::VerticalCenter);
        let striped = plain.clone().set_background_color(Color::RGB(STRIPE_FILL));
        let amount = |base: &Format| base.clone().set_num_format(YEN_FORMAT);

        Self {
            header: Format::new()
                .set_bold()
                .set_font_size(12)
                .set_background_color(Color::RGB(HEADER_FILL))
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin),
            amount: [amount(&plain), amount(&striped)],
            text: [plain, striped],
            total_label: Format::new()
                .set_bold()
                .set_font_size(12)
                .set_align(FormatAlign::Right),
            total_amount: Format::new()
                .set_bold()
                .set_font_size(12)
                .set_num_format(YEN_FORMAT)
                .set_background_color(Color::RGB(TOTAL_FILL))
                .set_align(FormatAlign::Right)
                .set_border(FormatBorder::Medium),
        }
    }
}

/// Workbook bytes with one styled sheet
pub(super) fn encode(ledger: &ReconciledLedger, widths: &[usize; 9]) -> Result<Vec<u8>> {
    let styles = Styles::new();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, name) in HEADER.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, &styles.header)?;
    }

    for (i, row) in ledger.rows.iter().enumerate() {
        let r = i as u32 + 1;
        // even sheet rows are striped; the first data row is row 2
        let stripe = usize::from(i % 2 == 0);
        let (text, amount) = (&styles.text[stripe], &styles.amount[stripe]);

        for (col, cell) in row.cells().iter().enumerate() {
            let c = col as u16;
            match col {
                0 => sheet.write_number_with_format(r, c, row.sequence, text)?,
                AMOUNT_COLUMN => {
                    sheet.write_number_with_format(r, c, row.entry.amount as f64, amount)?
                }
                _ if cell.is_empty() => sheet.write_blank(r, c, text)?,
                _ => sheet.write_string_with_format(r, c, cell, text)?,
            };
        }
    }

    let total_row = ledger.rows.len() as u32 + 1;
    sheet.write_number_with_format(
        total_row,
        AMOUNT_COLUMN as u16,
        ledger.total as f64,
        &styles.total_amount,
    )?;
    sheet.write_string_with_format(
        total_row,
        DESCRIPTION_COLUMN as u16,
        TOTAL_LABEL,
        &styles.total_label,
    )?;

    for (col, width) in widths.iter().enumerate() {
        sheet.set_column_width(col as u16, *width as f64)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    Ok(workbook.save_to_buffer()?)
}

/// Cell text of the first sheet, header first
pub(super) fn decode(location: &Path) -> Result<Vec<Vec<String>>> {
    let unreadable = |e: calamine::XlsxError| {
        Error::Ledger(format!("cannot read {}: {}", location.display(), e))
    };

    let mut workbook = open_workbook::<Xlsx<_>, _>(location).map_err(unreadable)?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(unreadable)?,
        None => return Ok(Vec::new()),
    };

    // the range starts at the first used cell
    let (top, left) = range.start().unwrap_or((0, 0));
    let mut rows: Vec<Vec<String>> = (0..top).map(|_| Vec::new()).collect();
    for cells in range.rows() {
        let mut row = vec![String::new(); left as usize];
        row.extend(cells.iter().map(cell_text));
        rows.push(row);
    }
    Ok(rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && *f >= 0.0 => format!("{:.0}", f),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => cell
            .as_date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        other => format!("#{:?}", other),
    }
}
