//! Marker mutation engine.
//!
//! Two markers are resolved per build. The descriptive marker paragraph has
//! its content replaced by caller text. The quantitative marker goes through
//! [`plan_table_mutation`] and [`apply_plan`]:
//!
//! 1. the marker paragraph is emptied and ends with a page break;
//! 2. stale paragraphs after it (blank, header labels, page/section breaks)
//!    are removed up to the first table or real content;
//! 3. a reached table is moved right after the marker, cut down to its
//!    header row and reshaped to the seven canonical columns, otherwise a
//!    new table is inserted there;
//! 4. one data row per line item is appended;
//! 5. the table style is set and cell paragraph spacing zeroed.
//!
//! Both markers are consumed, so running the engine again on its own output
//! changes nothing.

pub mod markers;
pub mod plan;

use tracing::{debug, info};

use crate::docx::blocks::{
    append_row, clear_with_page_break, new_table, rewrite_header, set_column_count,
    set_paragraph_text, set_table_style, truncate_to_header, zero_cell_spacing,
};
use crate::docx::blocks::P;
use crate::docx::xml::{Element, Node};
use crate::docx::Body;
use crate::models::LineItem;

pub use markers::{find_marker, MarkerSpec};
pub use plan::{plan_table_mutation, snapshot, BlockSnapshot, Destination, EditPlan, PurgeRules};

/// What a quantitative mutation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcome {
    MarkerAbsent,
    /// Marker consumed, no line items to write.
    MarkerCleared,
    Relocated { rows: usize },
    Created { rows: usize },
}

/// Options for the quantitative pass.
#[derive(Debug, Clone)]
pub struct TableOptions {
    pub purge: PurgeRules,
    pub style: String,
    /// Paragraph written after a consumed marker when there are no line items.
    pub empty_notice: Option<String>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            purge: PurgeRules::default(),
            style: "TableGrid".to_string(),
            empty_notice: None,
        }
    }
}

/// Executes a plan computed from the current state of `body`.
pub fn apply_plan(body: &mut Body, plan: &EditPlan) -> TableOutcome {
    let Some(marker) = body.element_mut(plan.marker) else {
        return TableOutcome::MarkerAbsent;
    };
    clear_with_page_break(marker);

    for id in &plan.remove {
        body.remove_paragraph(*id);
    }

    let (table_id, outcome) = match plan.destination {
        None => return TableOutcome::MarkerCleared,
        Some(Destination::Relocate { table, .. }) => {
            body.move_table_after(table, plan.marker);
            if let Some(tbl) = body.element_mut(table) {
                truncate_to_header(tbl);
                if tbl.child("w:tr").is_none() {
                    if let Some(header) = new_table(&plan.header, &plan.style).child("w:tr") {
                        tbl.children.push(Node::Element(header.clone()));
                    }
                }
                set_column_count(tbl, plan.columns());
                rewrite_header(tbl, &plan.header);
            }
            (Some(table), TableOutcome::Relocated { rows: plan.rows.len() })
        }
        Some(Destination::Create) => (
            body.insert_after(plan.marker, new_table(&plan.header, &plan.style)),
            TableOutcome::Created { rows: plan.rows.len() },
        ),
    };

    if let Some(tbl) = table_id.and_then(|id| body.element_mut(id)) {
        let columns = plan.columns();
        for row in &plan.rows {
            append_row(tbl, row, columns);
        }
        set_table_style(tbl, &plan.style);
        zero_cell_spacing(tbl);
    }
    outcome
}

/// Plans and applies the quantitative marker mutation.
pub fn mutate_table(
    body: &mut Body,
    marker: &MarkerSpec,
    items: &[LineItem],
    options: &TableOptions,
) -> TableOutcome {
    let blocks = snapshot(body);
    let Some(plan) = plan_table_mutation(&blocks, marker, items, &options.purge, &options.style)
    else {
        debug!(marker = marker.name(), "marker absent, table step skipped");
        return TableOutcome::MarkerAbsent;
    };
    let outcome = apply_plan(body, &plan);
    let notice = options.empty_notice.as_deref();
    if let (TableOutcome::MarkerCleared, Some(notice)) = (outcome, notice) {
        let mut p = Element::new(P);
        set_paragraph_text(&mut p, notice);
        body.insert_after(plan.marker, p);
        debug!(marker = marker.name(), "no line items, notice written");
    }
    info!(
        marker = marker.name(),
        removed = plan.remove.len(),
        ?outcome,
        "quantitative marker resolved"
    );
    outcome
}

/// Replaces the descriptive marker paragraph's content with `text`.
///
/// Returns `false` when the marker is absent.
pub fn replace_descriptive_marker(body: &mut Body, marker: &MarkerSpec, text: &str) -> bool {
    let Some(id) = find_marker(body, marker) else {
        debug!(marker = marker.name(), "marker absent, descriptive step skipped");
        return false;
    };
    match body.element_mut(id) {
        Some(p) => {
            set_paragraph_text(p, text);
            debug!(marker = marker.name(), "descriptive marker resolved");
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::blocks::{paragraph_text, table_cell_texts, text_run};
    use crate::docx::Block;
    use crate::models::canonical_labels;

    fn para(text: &str) -> Element {
        Element::new(P).with_child(text_run(text, None))
    }

    fn body_of(children: Vec<Element>) -> Body {
        let mut body = Element::new("w:body");
        for c in children {
            body.children.push(Node::Element(c));
        }
        Body::from_element(body)
    }

    fn outline(body: &Body) -> Vec<String> {
        body.blocks()
            .map(|b| match b {
                Block::Paragraph(p) => p.text(),
                Block::Table(t) => format!("<table {}x{}>", t.row_count(), t.column_count()),
            })
            .collect()
    }

    fn items() -> Vec<LineItem> {
        vec![
            LineItem {
                reference: "F1".into(),
                dimension: "1200x1000".into(),
                typology: "Fenêtre PVC".into(),
                quantity: 4,
                comment: "RAL 9010".into(),
                ..Default::default()
            },
            LineItem {
                reference: "P1".into(),
                typology: "Porte d'entrée".into(),
                quantity: 1,
                ..Default::default()
            },
        ]
    }

    fn table_count(body: &Body) -> usize {
        body.blocks().filter(|b| matches!(b, Block::Table(_))).count()
    }

    #[test]
    fn creates_table_after_marker() {
        let mut body = body_of(vec![para("Intro"), para("[TABLEAU_QUANTITATIF]"), para("Fin")]);
        let outcome = mutate_table(
            &mut body,
            &MarkerSpec::quantitative(),
            &items(),
            &TableOptions::default(),
        );
        assert_eq!(outcome, TableOutcome::Created { rows: 2 });
        assert_eq!(outline(&body), vec!["Intro", "", "<table 3x7>", "Fin"]);

        let Some(Block::Table(t)) = body.blocks().nth(2) else {
            panic!("expected table");
        };
        let cells = t.cell_texts();
        assert_eq!(cells[0], canonical_labels());
        assert_eq!(cells[1][2], "Fenêtre PVC");
        assert_eq!(cells[1][4], "4");
        assert_eq!(cells[2][0], "P1");
    }

    #[test]
    fn existing_table_is_reused_and_stale_labels_purged() {
        let mut old = new_table(&["A".into(), "B".into(), "C".into(), "D".into(), "E".into(), "F".into(), "G".into()], "Old");
        append_row(&mut old, &["stale".into()], 7);
        let mut body = body_of(vec![
            para("{{TABLEAU_QUANTITATIF}}"),
            para(""),
            para("Typologie"),
            old,
            para("Suite"),
        ]);
        let outcome = mutate_table(
            &mut body,
            &MarkerSpec::quantitative(),
            &items(),
            &TableOptions::default(),
        );
        assert_eq!(outcome, TableOutcome::Relocated { rows: 2 });
        assert_eq!(outline(&body), vec!["", "<table 3x7>", "Suite"]);
        let Some(Block::Table(t)) = body.blocks().nth(1) else {
            panic!("expected table");
        };
        let cells = t.cell_texts();
        assert_eq!(cells[0], canonical_labels());
        assert!(cells.iter().all(|row| !row.contains(&"stale".to_string())));
        let style = t
            .element()
            .child("w:tblPr")
            .and_then(|p| p.child("w:tblStyle"))
            .and_then(|s| s.attr("w:val"));
        assert_eq!(style, Some("TableGrid"));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let mut body = body_of(vec![para("[TABLEAU_QUANTITATIF]"), para("")]);
        let opts = TableOptions::default();
        mutate_table(&mut body, &MarkerSpec::quantitative(), &items(), &opts);
        let first = body.to_element();
        let again = mutate_table(&mut body, &MarkerSpec::quantitative(), &items(), &opts);
        assert_eq!(again, TableOutcome::MarkerAbsent);
        assert_eq!(body.to_element(), first);
        assert_eq!(table_count(&body), 1);
        assert!(!body
            .blocks()
            .any(|b| matches!(b, Block::Paragraph(p) if MarkerSpec::quantitative().matches(&p.text()))));
    }

    #[test]
    fn empty_items_clear_marker_without_table() {
        let existing = new_table(&["x".into()], "Old");
        let mut body = body_of(vec![
            para("[DESCRIPTIF]"),
            para("[TABLEAU_QUANTITATIF]"),
            para(""),
            existing,
        ]);
        assert!(replace_descriptive_marker(
            &mut body,
            &MarkerSpec::descriptive(),
            "Remplacement des menuiseries extérieures."
        ));
        let outcome = mutate_table(&mut body, &MarkerSpec::quantitative(), &[], &TableOptions::default());
        assert_eq!(outcome, TableOutcome::MarkerCleared);
        assert_eq!(
            outline(&body),
            vec!["Remplacement des menuiseries extérieures.", "", "", "<table 1x1>"]
        );
        let Some(Block::Paragraph(marker)) = body.blocks().nth(1) else {
            panic!("expected paragraph");
        };
        assert!(marker.has_page_or_section_break());
    }

    #[test]
    fn descriptive_marker_absent_is_reported() {
        let mut body = body_of(vec![para("Aucun marqueur")]);
        assert!(!replace_descriptive_marker(&mut body, &MarkerSpec::descriptive(), "x"));
        let Some(Block::Paragraph(p)) = body.blocks().next() else {
            panic!("expected paragraph");
        };
        assert_eq!(paragraph_text(p.element()), "Aucun marqueur");
    }

    fn relocated_cells(width: usize) -> Vec<Vec<String>> {
        let labels: Vec<String> = (0..width).map(|i| format!("Col {}", i)).collect();
        let mut old = new_table(&labels, "Old");
        append_row(&mut old, &labels, width);
        let mut body = body_of(vec![para("[TABLEAU_QUANTITATIF]"), old, para("Fin")]);
        let outcome = mutate_table(&mut body, &MarkerSpec::quantitative(), &items(), &TableOptions::default());
        assert_eq!(outcome, TableOutcome::Relocated { rows: 2 });
        assert_eq!(outline(&body), vec!["", "<table 3x7>", "Fin"]);
        let Some(Block::Table(t)) = body.blocks().nth(1) else {
            panic!("expected table");
        };
        table_cell_texts(t.element())
    }

    #[test]
    fn narrow_existing_table_is_widened_to_all_fields() {
        let cells = relocated_cells(3);
        assert_eq!(cells[0], canonical_labels());
        assert_eq!(
            cells[1],
            vec!["F1", "1200x1000", "Fenêtre PVC", "", "4", "", "RAL 9010"]
        );
        assert_eq!(cells[2], vec!["P1", "", "Porte d'entrée", "", "1", "", ""]);
    }

    #[test]
    fn wide_existing_table_is_narrowed_to_all_fields() {
        let cells = relocated_cells(9);
        assert_eq!(cells[0], canonical_labels());
        assert!(cells.iter().all(|row| row.len() == 7));
        assert_eq!(cells[1][6], "RAL 9010");
    }

    #[test]
    fn empty_items_write_the_configured_notice() {
        let mut body = body_of(vec![para("[TABLEAU_QUANTITATIF]"), para("Fin")]);
        let opts = TableOptions {
            empty_notice: Some("Aucune donnée trouvée dans le DPGF.".to_string()),
            ..TableOptions::default()
        };
        let outcome = mutate_table(&mut body, &MarkerSpec::quantitative(), &[], &opts);
        assert_eq!(outcome, TableOutcome::MarkerCleared);
        assert_eq!(
            outline(&body),
            vec!["", "Aucune donnée trouvée dans le DPGF.", "Fin"]
        );

        let first = body.to_element();
        mutate_table(&mut body, &MarkerSpec::quantitative(), &[], &opts);
        assert_eq!(body.to_element(), first);
    }
}
