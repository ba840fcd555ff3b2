//! Edit planning over an immutable snapshot of the block sequence.
//!
//! [`plan_table_mutation`] never touches a document: it reads a
//! [`BlockSnapshot`] slice and returns an [`EditPlan`] that
//! [`apply_plan`](super::apply_plan) executes in one pass.

use crate::docx::{Block, BlockId, Body};
use crate::models::{canonical_labels, LineItem};
use crate::normalize::is_blank;
use crate::schema::normalize_header;

use super::markers::MarkerSpec;

/// What the planner needs to know about one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSnapshot {
    Paragraph {
        id: BlockId,
        text: String,
        has_break: bool,
    },
    Table {
        id: BlockId,
        columns: usize,
    },
}

impl BlockSnapshot {
    pub fn id(&self) -> BlockId {
        match self {
            BlockSnapshot::Paragraph { id, .. } | BlockSnapshot::Table { id, .. } => *id,
        }
    }
}

/// Captures the current block sequence.
pub fn snapshot(body: &Body) -> Vec<BlockSnapshot> {
    body.blocks()
        .map(|b| match b {
            Block::Paragraph(p) => BlockSnapshot::Paragraph {
                id: p.id(),
                text: p.text(),
                has_break: p.has_page_or_section_break(),
            },
            Block::Table(t) => BlockSnapshot::Table {
                id: t.id(),
                columns: t.column_count(),
            },
        })
        .collect()
}

/// Header-label tokens that mark a leftover paragraph as stale.
#[derive(Debug, Clone)]
pub struct PurgeRules {
    prefixes: Vec<String>,
}

impl Default for PurgeRules {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

impl PurgeRules {
    /// Canonical labels plus `extra` tokens.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut prefixes: Vec<String> = canonical_labels()
            .iter()
            .map(|l| normalize_header(l))
            .collect();
        for token in extra {
            let token = normalize_header(token.as_ref());
            if !token.is_empty() && !prefixes.contains(&token) {
                prefixes.push(token);
            }
        }
        Self { prefixes }
    }

    /// Whether a paragraph with this text and break state is stale.
    pub fn is_stale(&self, text: &str, has_break: bool) -> bool {
        if has_break || is_blank(text) {
            return true;
        }
        let normalized = normalize_header(text);
        self.prefixes.iter().any(|p| normalized.starts_with(p.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Reuse an existing table; `columns` is its width before reshaping.
    Relocate { table: BlockId, columns: usize },
    /// Insert a new table with one column per canonical field.
    Create,
}

/// Structural edits for one quantitative marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditPlan {
    pub marker: BlockId,
    pub remove: Vec<BlockId>,
    /// `None` when there is nothing to populate: only the marker is cleared.
    pub destination: Option<Destination>,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub style: String,
}

impl EditPlan {
    /// Column count of the populated table, one per canonical field.
    pub fn columns(&self) -> usize {
        self.header.len()
    }
}

/// Plans the quantitative-marker mutation.
///
/// Returns `None` when no paragraph carries the marker.
pub fn plan_table_mutation(
    blocks: &[BlockSnapshot],
    marker: &MarkerSpec,
    items: &[LineItem],
    purge: &PurgeRules,
    style: &str,
) -> Option<EditPlan> {
    let marker_pos = blocks.iter().position(|b| {
        matches!(b, BlockSnapshot::Paragraph { text, .. } if marker.matches(text))
    })?;
    let marker_id = blocks[marker_pos].id();

    let mut plan = EditPlan {
        marker: marker_id,
        remove: Vec::new(),
        destination: None,
        header: Vec::new(),
        rows: Vec::new(),
        style: style.to_string(),
    };
    if items.is_empty() {
        return Some(plan);
    }

    let mut destination = Destination::Create;
    for block in &blocks[marker_pos + 1..] {
        match block {
            BlockSnapshot::Table { id, columns } => {
                destination = Destination::Relocate {
                    table: *id,
                    columns: *columns,
                };
                break;
            }
            BlockSnapshot::Paragraph {
                id,
                text,
                has_break,
            } => {
                if purge.is_stale(text, *has_break) {
                    plan.remove.push(*id);
                } else {
                    break;
                }
            }
        }
    }

    plan.header = canonical_labels();
    plan.rows = items.iter().map(|item| item.cells().to_vec()).collect();
    plan.destination = Some(destination);
    Some(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::blocks::{text_run, P};
    use crate::docx::xml::{Element, Node};

    /// Builds real ids through a body so snapshots can be hand-written.
    fn ids(n: usize) -> Vec<BlockId> {
        let mut body = Element::new("w:body");
        for _ in 0..n {
            body.children
                .push(Node::Element(Element::new(P).with_child(text_run("x", None))));
        }
        Body::from_element(body).blocks().map(|b| b.id()).collect()
    }

    fn para(id: BlockId, text: &str) -> BlockSnapshot {
        BlockSnapshot::Paragraph {
            id,
            text: text.to_string(),
            has_break: false,
        }
    }

    fn item(typology: &str, quantity: i64) -> LineItem {
        LineItem {
            reference: "L1".into(),
            typology: typology.into(),
            quantity,
            ..Default::default()
        }
    }

    #[test]
    fn absent_marker_yields_no_plan() {
        let id = ids(1);
        let blocks = vec![para(id[0], "Introduction")];
        let plan = plan_table_mutation(
            &blocks,
            &MarkerSpec::quantitative(),
            &[item("Porte", 1)],
            &PurgeRules::default(),
            "TableGrid",
        );
        assert!(plan.is_none());
    }

    #[test]
    fn empty_items_only_clear_the_marker() {
        let id = ids(3);
        let blocks = vec![
            para(id[0], "[TABLEAU_QUANTITATIF]"),
            para(id[1], ""),
            BlockSnapshot::Table { id: id[2], columns: 7 },
        ];
        let plan = plan_table_mutation(
            &blocks,
            &MarkerSpec::quantitative(),
            &[],
            &PurgeRules::default(),
            "TableGrid",
        )
        .unwrap();
        assert_eq!(plan.marker, id[0]);
        assert!(plan.remove.is_empty());
        assert_eq!(plan.destination, None);
        assert!(plan.rows.is_empty());
    }

    #[test]
    fn stale_paragraphs_are_purged_up_to_the_table() {
        let id = ids(6);
        let blocks = vec![
            para(id[0], "{{TABLEAU_QUANTITATIF}}"),
            para(id[1], "\u{a0} "),
            para(id[2], "Repère / Dimensions"),
            BlockSnapshot::Paragraph {
                id: id[3],
                text: String::new(),
                has_break: true,
            },
            BlockSnapshot::Table { id: id[4], columns: 5 },
            para(id[5], "Conclusion"),
        ];
        let plan = plan_table_mutation(
            &blocks,
            &MarkerSpec::quantitative(),
            &[item("Fenêtre", 3)],
            &PurgeRules::default(),
            "TableGrid",
        )
        .unwrap();
        assert_eq!(plan.remove, vec![id[1], id[2], id[3]]);
        assert_eq!(
            plan.destination,
            Some(Destination::Relocate { table: id[4], columns: 5 })
        );
        assert_eq!(plan.header, canonical_labels());
        assert_eq!(plan.columns(), 7);
        assert_eq!(plan.rows, vec![vec!["L1", "", "Fenêtre", "", "3", "", ""]]);
    }

    #[test]
    fn real_content_stops_the_scan_and_creates_a_table() {
        let id = ids(4);
        let blocks = vec![
            para(id[0], "[TABLEAU_QUANTITATIF]"),
            para(id[1], ""),
            para(id[2], "Les quantités sont données à titre indicatif."),
            BlockSnapshot::Table { id: id[3], columns: 3 },
        ];
        let plan = plan_table_mutation(
            &blocks,
            &MarkerSpec::quantitative(),
            &[item("Porte", 2), item("Châssis", 1)],
            &PurgeRules::default(),
            "Grille",
        )
        .unwrap();
        assert_eq!(plan.remove, vec![id[1]]);
        assert_eq!(plan.destination, Some(Destination::Create));
        assert_eq!(plan.header, canonical_labels());
        assert_eq!(plan.columns(), 7);
        assert_eq!(plan.rows.len(), 2);
        assert_eq!(plan.style, "Grille");
    }

    #[test]
    fn configured_purge_prefixes_are_accent_folded() {
        let purge = PurgeRules::new(["Tableau récapitulatif"]);
        assert!(purge.is_stale("TABLEAU RECAPITULATIF :", false));
        assert!(purge.is_stale("Quantité", false));
        assert!(!purge.is_stale("Fenêtres du rez-de-chaussée", false));
    }
}
