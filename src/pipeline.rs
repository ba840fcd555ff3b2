//! Archive → line items, and synthesized document → line items.

use tracing::{info, instrument, warn};

use crate::archive::ArchiveBundle;
use crate::config::Config;
use crate::docx::{Block, DocxPackage};
use crate::error::{DceError, Result};
use crate::models::{CandidateFile, CanonicalField, LineItem, RawTable};
use crate::normalize::normalize_rows;
use crate::patterns::PatternRules;
use crate::schema::{resolve_headers, HeaderMap};
use crate::tabular::read_table;

/// Result of [`extract_line_items`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub candidate: CandidateFile,
    /// Worksheet the rows came from, for spreadsheets.
    pub sheet: Option<String>,
    pub items: Vec<LineItem>,
    /// Canonical fields without a source column.
    pub unmapped: Vec<CanonicalField>,
    /// Rows dropped for lacking a typology.
    pub dropped: usize,
}

fn normalize_table(table: &RawTable, rules: &PatternRules) -> (HeaderMap, Vec<LineItem>, usize) {
    let map = resolve_headers(&table.headers);
    let mut rows = normalize_rows(&table.headers, &map, rules, &table.rows);
    let items: Vec<LineItem> = rows.by_ref().collect();
    let dropped = rows.dropped();
    (map, items, dropped)
}

/// Selects the quantitative table in the archive and normalizes its rows.
#[instrument(skip_all, fields(entries = bundle.len()))]
pub fn extract_line_items(bundle: &ArchiveBundle, config: &Config) -> Result<Extraction> {
    let rules = config.pattern_rules()?;
    let candidate = config
        .selector()
        .select(bundle.names())
        .ok_or(DceError::CandidateNotFound {
            entries: bundle.len(),
        })?;
    let bytes = bundle
        .get(&candidate.name)
        .ok_or_else(|| DceError::input_format(format!("entry {} not found", candidate.name)))?;

    let no_rows = || DceError::NoUsableRows {
        candidate: candidate.name.clone(),
    };
    let table = read_table(&candidate.name, bytes)?.ok_or_else(no_rows)?;
    let (map, items, dropped) = normalize_table(&table, &rules);
    if items.is_empty() {
        warn!(candidate = %candidate.name, dropped, "no usable rows");
        return Err(no_rows());
    }

    info!(
        candidate = %candidate.name,
        items = items.len(),
        dropped,
        rules = rules.version(),
        "line items extracted"
    );
    Ok(Extraction {
        sheet: table.sheet,
        unmapped: map.missing(),
        items,
        dropped,
        candidate,
    })
}

/// Reads the line items back from a synthesized document.
///
/// The destination table is the first body table whose header resolves
/// both typology and quantity. Returns an empty list when there is none.
pub fn read_destination_table(docx: &[u8]) -> Result<Vec<LineItem>> {
    let package = DocxPackage::from_bytes(docx)?;
    let rules = PatternRules::builtin();
    for block in package.body().blocks() {
        let Block::Table(table) = block else {
            continue;
        };
        let mut cells = table.cell_texts().into_iter();
        let Some(headers) = cells.next() else {
            continue;
        };
        let map = resolve_headers(&headers);
        if !(map.is_mapped(CanonicalField::Typology) && map.is_mapped(CanonicalField::Quantity)) {
            continue;
        }
        let raw = RawTable {
            headers,
            rows: cells.collect(),
            sheet: None,
        };
        return Ok(normalize_table(&raw, &rules).1);
    }
    Ok(Vec::new())
}
