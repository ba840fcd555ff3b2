//! Raw tabular decoding: delimited text and spreadsheets → [`RawTable`].
//!
//! Delimited text uses its first row as header; the delimiter (comma or
//! semicolon) is sniffed from the first few lines. Spreadsheets are scanned
//! sheet by sheet: the header is the first row within the first 20 with at
//! least two non-empty cells, and the first sheet whose header exposes both a
//! designation-like and a quantity-like column is used.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use encoding_rs::WINDOWS_1252;
use tracing::{debug, instrument};

use crate::archive::extension;
use crate::error::{DceError, Result};
use crate::models::RawTable;
use crate::normalize::is_blank;
use crate::schema::has_designation_and_quantity;

/// Rows inspected when looking for a spreadsheet header.
pub const HEADER_SCAN_ROWS: usize = 20;

/// Lines sampled for delimiter detection.
const DELIMITER_SAMPLE_LINES: usize = 5;

/// Decodes UTF-8 (BOM stripped), falling back to Windows-1252.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            debug!("not UTF-8, decoding as Windows-1252");
            WINDOWS_1252
                .decode_without_bom_handling(bytes)
                .0
                .into_owned()
        }
    }
}

/// Picks `;` or `,` from a sample of the first non-empty lines.
///
/// A delimiter found the same non-zero number of times on every sampled line
/// wins; otherwise the higher total count wins. Ties go to the comma.
pub fn detect_delimiter(text: &str) -> u8 {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(DELIMITER_SAMPLE_LINES)
        .collect();
    if sample.is_empty() {
        return b',';
    }

    let counts = |d: u8| -> Vec<usize> {
        sample
            .iter()
            .map(|l| l.bytes().filter(|b| *b == d).count())
            .collect()
    };
    let consistent = |c: &[usize]| c[0] > 0 && c.iter().all(|n| *n == c[0]);

    let comma = counts(b',');
    let semicolon = counts(b';');
    match (consistent(&comma), consistent(&semicolon)) {
        (true, false) => b',',
        (false, true) => b';',
        _ => {
            let total_comma: usize = comma.iter().sum();
            let total_semicolon: usize = semicolon.iter().sum();
            if total_semicolon > total_comma {
                b';'
            } else {
                b','
            }
        }
    }
}

/// Parses delimited text; the first row is the header.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn read_delimited(name: &str, bytes: &[u8]) -> Result<RawTable> {
    let text = decode_text(bytes);
    let delimiter = detect_delimiter(&text);
    debug!(delimiter = %(delimiter as char), "parsing delimited text");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let headers = match records.next() {
        Some(record) => record
            .map_err(|e| DceError::tabular(name, e))?
            .iter()
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };
    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| DceError::tabular(name, e))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(RawTable {
        headers,
        rows,
        sheet: None,
    })
}

/// Text of a spreadsheet cell; whole numbers lose their decimal part.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

fn non_empty_cells(row: &[String]) -> usize {
    row.iter().filter(|c| !is_blank(c)).count()
}

/// Splits a sheet grid into header + rows, when a header can be found.
fn table_from_grid(grid: Vec<Vec<String>>, sheet: &str) -> Option<RawTable> {
    let header_idx = grid
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| non_empty_cells(row) >= 2)?;
    let mut rows = grid.into_iter().skip(header_idx);
    let headers = rows.next()?;
    Some(RawTable {
        headers,
        rows: rows.collect(),
        sheet: Some(sheet.to_string()),
    })
}

/// Parses a workbook, returning the first sheet with designation and quantity columns.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn read_spreadsheet(name: &str, bytes: &[u8]) -> Result<Option<RawTable>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| DceError::tabular(name, e))?;

    for sheet in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&sheet) {
            Ok(range) => range,
            Err(e) => {
                debug!(sheet = %sheet, error = %e, "sheet skipped");
                continue;
            }
        };
        let grid: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        let Some(table) = table_from_grid(grid, &sheet) else {
            continue;
        };
        if has_designation_and_quantity(&table.headers) {
            debug!(sheet = %sheet, rows = table.rows.len(), "sheet selected");
            return Ok(Some(table));
        }
    }
    Ok(None)
}

/// Dispatches on the entry's extension.
///
/// Returns `Ok(None)` when a workbook has no sheet with a usable header.
pub fn read_table(name: &str, bytes: &[u8]) -> Result<Option<RawTable>> {
    match extension(name).as_deref() {
        Some("csv") => read_delimited(name, bytes).map(Some),
        Some(_) => read_spreadsheet(name, bytes),
        None => Err(DceError::tabular(name, "missing file extension")),
    }
}
