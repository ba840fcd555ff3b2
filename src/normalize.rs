//! Raw rows → [`LineItem`]s.
//!
//! [`normalize_rows`] returns a lazy, single-pass iterator over the raw rows.
//! Re-running means calling it again on the same rows. Blank rows are
//! skipped, rows without a typology are dropped, and an unparsable quantity
//! becomes `0` (the row is kept). Missing dimension and performance columns
//! are inferred from the typology text through [`PatternRules`].

use tracing::warn;

use crate::models::{CanonicalField, LineItem};
use crate::patterns::PatternRules;
use crate::schema::{fallback_column, HeaderMap, DESIGNATION_PREFIXES, QUANTITY_PREFIXES};

/// Locale-tolerant integer parsing, truncating any fractional part.
///
/// Accepts a comma as decimal separator and spaces (including non-breaking
/// ones) as thousands separators. A trailing unit (`"4 u"`) is ignored.
pub fn parse_quantity(text: &str) -> Option<i64> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if compact.is_empty() {
        return None;
    }
    if let Ok(value) = compact.parse::<f64>() {
        return value.is_finite().then(|| value.trunc() as i64);
    }
    let prefix_len = compact
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-'))
        .count();
    compact[..prefix_len]
        .trim_end_matches('.')
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
}

/// Whitespace-only, non-breaking spaces included.
pub fn is_blank(cell: &str) -> bool {
    cell.chars().all(char::is_whitespace)
}

/// Lazily resolved fallback column: `None` until first needed.
#[derive(Debug, Clone, Copy)]
enum Fallback {
    Unresolved,
    Resolved(Option<usize>),
}

/// Iterator returned by [`normalize_rows`].
pub struct LineItems<'a, I> {
    rows: I,
    headers: &'a [String],
    map: &'a HeaderMap,
    rules: &'a PatternRules,
    position: usize,
    typology_fallback: Fallback,
    quantity_fallback: Fallback,
    dropped: usize,
    unparsed_quantities: usize,
}

/// Normalize raw rows against a resolved header map.
pub fn normalize_rows<'a, I, R>(
    headers: &'a [String],
    map: &'a HeaderMap,
    rules: &'a PatternRules,
    rows: I,
) -> LineItems<'a, I::IntoIter>
where
    I: IntoIterator<Item = R>,
    R: AsRef<[String]>,
{
    LineItems {
        rows: rows.into_iter(),
        headers,
        map,
        rules,
        position: 0,
        typology_fallback: Fallback::Unresolved,
        quantity_fallback: Fallback::Unresolved,
        dropped: 0,
        unparsed_quantities: 0,
    }
}

impl<'a, I> LineItems<'a, I> {
    /// Rows dropped so far for lacking a typology.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Kept rows whose non-empty quantity cell did not parse and became `0`.
    pub fn unparsed_quantities(&self) -> usize {
        self.unparsed_quantities
    }

    fn column(&mut self, field: CanonicalField) -> Option<usize> {
        if let Some(col) = self.map.get(field) {
            return Some(col);
        }
        let (slot, prefixes) = match field {
            CanonicalField::Typology => (&mut self.typology_fallback, DESIGNATION_PREFIXES),
            CanonicalField::Quantity => (&mut self.quantity_fallback, QUANTITY_PREFIXES),
            _ => return None,
        };
        match *slot {
            Fallback::Resolved(col) => col,
            Fallback::Unresolved => {
                let col = fallback_column(self.headers, prefixes);
                *slot = Fallback::Resolved(col);
                col
            }
        }
    }

    fn build(&mut self, row: &[String]) -> Option<LineItem> {
        let cell = |col: Option<usize>| -> String {
            col.and_then(|c| row.get(c))
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };

        let typology = cell(self.column(CanonicalField::Typology));
        if typology.is_empty() {
            return None;
        }

        let quantity_col = self.column(CanonicalField::Quantity);
        let raw_quantity = cell(quantity_col);
        let quantity = match parse_quantity(&raw_quantity) {
            Some(q) => q,
            None => {
                if !raw_quantity.is_empty() {
                    self.unparsed_quantities += 1;
                    warn!(
                        row = self.position,
                        cell = %raw_quantity,
                        "quantity not understood, using 0"
                    );
                }
                0
            }
        };

        let dimension = match self.map.get(CanonicalField::Dimension) {
            Some(col) => cell(Some(col)),
            None => self.rules.infer(CanonicalField::Dimension, &typology),
        };
        let performance = match self.map.get(CanonicalField::Performance) {
            Some(col) => cell(Some(col)),
            None => self.rules.infer(CanonicalField::Performance, &typology),
        };
        let reference = match self.map.get(CanonicalField::Reference) {
            Some(col) => cell(Some(col)),
            None => format!("L{}", self.position),
        };

        Some(LineItem {
            reference,
            dimension,
            typology,
            performance,
            quantity,
            install_mode: cell(self.map.get(CanonicalField::InstallMode)),
            comment: cell(self.map.get(CanonicalField::Comment)),
        })
    }
}

impl<'a, I, R> Iterator for LineItems<'a, I>
where
    I: Iterator<Item = R>,
    R: AsRef<[String]>,
{
    type Item = LineItem;

    fn next(&mut self) -> Option<LineItem> {
        loop {
            let row = self.rows.next()?;
            let row = row.as_ref();
            self.position += 1;
            if row.iter().all(|c| is_blank(c)) {
                continue;
            }
            match self.build(row) {
                Some(item) => return Some(item),
                None => {
                    self.dropped += 1;
                    tracing::trace!(row = self.position, "row dropped: empty typology");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::resolve_headers;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn run(headers: &[&str], rows: &[&[&str]]) -> Vec<LineItem> {
        let headers = strings(headers);
        let rows: Vec<Vec<String>> = rows.iter().map(|r| strings(r)).collect();
        let map = resolve_headers(&headers);
        let rules = PatternRules::builtin();
        normalize_rows(&headers, &map, &rules, &rows).collect()
    }

    #[test]
    fn quantity_parsing_is_locale_tolerant() {
        assert_eq!(parse_quantity("4"), Some(4));
        assert_eq!(parse_quantity("12,5"), Some(12));
        assert_eq!(parse_quantity("12.9"), Some(12));
        assert_eq!(parse_quantity("1 200"), Some(1200));
        assert_eq!(parse_quantity("1\u{a0}200,75"), Some(1200));
        assert_eq!(parse_quantity("4 u"), Some(4));
        assert_eq!(parse_quantity("-3,5"), Some(-3));
        assert_eq!(parse_quantity("ens"), None);
        assert_eq!(parse_quantity(""), None);
    }

    #[test]
    fn designation_row_with_inferred_dimension() {
        let items = run(
            &["Désignation", "Qté", "Observations"],
            &[&["Fenêtre PVC 1200x1000", "4", "RAL 9010"]],
        );
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.typology, "Fenêtre PVC 1200x1000");
        assert_eq!(item.quantity, 4);
        assert_eq!(item.dimension, "1200x1000");
        assert_eq!(item.comment, "RAL 9010");
        assert_eq!(item.reference, "L1");
        assert_eq!(item.performance, "");
    }

    #[test]
    fn decimal_quantity_is_truncated() {
        let items = run(&["Désignation", "Qté"], &[&["Porte EI 30", "12,5"]]);
        assert_eq!(items[0].quantity, 12);
        assert_eq!(items[0].performance, "EI 30");
    }

    #[test]
    fn unparsable_quantity_keeps_row_with_zero() {
        let items = run(&["Désignation", "Qté"], &[&["Volet roulant", "ens."]]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 0);
    }

    #[test]
    fn ambiguous_separators_fall_back_to_zero_and_are_counted() {
        assert_eq!(parse_quantity("1.200,75"), None);
        assert_eq!(parse_quantity("1,234,567"), None);

        let headers = strings(&["Désignation", "Qté"]);
        let rows = vec![
            strings(&["Fenêtre", "1.200,75"]),
            strings(&["Porte", "1,234,567"]),
            strings(&["Volet", ""]),
            strings(&["Châssis", "3"]),
        ];
        let map = resolve_headers(&headers);
        let rules = PatternRules::builtin();
        let mut iter = normalize_rows(&headers, &map, &rules, &rows);
        let quantities: Vec<i64> = iter.by_ref().map(|i| i.quantity).collect();
        assert_eq!(quantities, vec![0, 0, 0, 3]);
        assert_eq!(iter.unparsed_quantities(), 2, "an empty cell is not counted");
    }

    #[test]
    fn rows_without_typology_are_dropped_and_blank_rows_skipped() {
        let headers = strings(&["Repère", "Désignation", "Qté"]);
        let rows = vec![
            strings(&["A1", "Fenêtre", "2"]),
            strings(&["", "  ", ""]),
            strings(&["A2", "", "5"]),
            strings(&["A3", "Porte", "1"]),
        ];
        let map = resolve_headers(&headers);
        let rules = PatternRules::builtin();
        let mut iter = normalize_rows(&headers, &map, &rules, &rows);
        let items: Vec<LineItem> = iter.by_ref().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(iter.dropped(), 1);
        assert!(items.iter().all(|i| !i.typology.is_empty()));
        assert_eq!(items[1].reference, "A3");
    }

    #[test]
    fn positional_reference_counts_source_rows() {
        let items = run(
            &["Désignation", "Qté"],
            &[&["Fenêtre", "1"], &["", ""], &["Porte", "2"]],
        );
        assert_eq!(items[0].reference, "L1");
        assert_eq!(items[1].reference, "L3");
    }

    #[test]
    fn fallback_columns_are_used_for_long_headers() {
        let items = run(
            &["Désignation des ouvrages", "Unité", "Quantité totale"],
            &[&["Baie coulissante 2400x2150", "U", "3"]],
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].typology, "Baie coulissante 2400x2150");
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].dimension, "2400x2150");
    }

    #[test]
    fn mapped_dimension_is_not_overridden_by_inference() {
        let items = run(
            &["Dim", "Type", "Qte"],
            &[&["", "Fenêtre 1200x1000", "1"]],
        );
        assert_eq!(items[0].dimension, "");
    }

    #[test]
    fn short_rows_yield_empty_cells() {
        let items = run(&["Désignation", "Qté", "Obs"], &[&["Châssis fixe"]]);
        assert_eq!(items[0].quantity, 0);
        assert_eq!(items[0].comment, "");
    }

    #[test]
    fn normalizer_never_emits_empty_typology() {
        let headers = strings(&["Type", "Qté"]);
        let rows: Vec<Vec<String>> = (0..40)
            .map(|i| {
                let typology = if i % 3 == 0 { String::new() } else { format!("Item {}", i) };
                vec![typology, format!("{},{}", i, i % 10)]
            })
            .collect();
        let map = resolve_headers(&headers);
        let rules = PatternRules::builtin();
        let items: Vec<LineItem> = normalize_rows(&headers, &map, &rules, &rows).collect();
        assert!(!items.is_empty());
        assert!(items.iter().all(|i| !i.typology.trim().is_empty()));
    }

    #[test]
    fn rerunning_on_same_rows_gives_same_items() {
        let headers = strings(&["Désignation", "Qté"]);
        let rows = vec![strings(&["Fenêtre", "2"]), strings(&["Porte", "1"])];
        let map = resolve_headers(&headers);
        let rules = PatternRules::builtin();
        let first: Vec<LineItem> = normalize_rows(&headers, &map, &rules, &rows).collect();
        let second: Vec<LineItem> = normalize_rows(&headers, &map, &rules, &rows).collect();
        assert_eq!(first, second);
    }
}
