//! Block view of a WordprocessingML body.
//!
//! [`Body`] owns the children of `w:body`. Every child gets a stable
//! [`BlockId`] when the body is loaded (or when an element is inserted), so a
//! paragraph or table found once can be located again after edits shift
//! positions. [`Body::blocks`] yields the paragraphs and tables in document
//! order as borrowed views; it always reflects the current state.
//!
//! Body children that are neither `w:p` nor `w:tbl` (final `w:sectPr`,
//! bookmarks, content controls, whitespace) stay in place and are never
//! exposed as blocks.

use super::xml::{Element, Node};

pub const P: &str = "w:p";
pub const TBL: &str = "w:tbl";
const PPR: &str = "w:pPr";
const R: &str = "w:r";
const RPR: &str = "w:rPr";
const T: &str = "w:t";
const BR: &str = "w:br";
const TR: &str = "w:tr";
const TC: &str = "w:tc";
const TCPR: &str = "w:tcPr";
const TBLPR: &str = "w:tblPr";
const TBLGRID: &str = "w:tblGrid";

/// `w:pPr` children that follow `w:spacing`.
const SPACING_FOLLOWERS: &[&str] = &[
    "w:ind",
    "w:contextualSpacing",
    "w:mirrorIndents",
    "w:suppressOverlap",
    "w:jc",
    "w:textDirection",
    "w:textAlignment",
    "w:textboxTightWrap",
    "w:outlineLvl",
    "w:divId",
    "w:cnfStyle",
    "w:rPr",
    "w:sectPr",
    "w:pPrChange",
];

/// Identity of a body child, stable across structural edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u64);

#[derive(Debug, Clone, Copy)]
pub struct Paragraph<'a> {
    id: BlockId,
    element: &'a Element,
}

impl<'a> Paragraph<'a> {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn element(&self) -> &'a Element {
        self.element
    }

    pub fn text(&self) -> String {
        paragraph_text(self.element)
    }

    /// Number of text runs; markers are often split across several.
    pub fn run_count(&self) -> usize {
        self.element.elements().filter(|e| e.is(R)).count()
    }

    pub fn has_page_or_section_break(&self) -> bool {
        has_page_or_section_break(self.element)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    id: BlockId,
    element: &'a Element,
}

impl<'a> Table<'a> {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn element(&self) -> &'a Element {
        self.element
    }

    /// Cell texts, row by row.
    pub fn cell_texts(&self) -> Vec<Vec<String>> {
        table_cell_texts(self.element)
    }

    pub fn column_count(&self) -> usize {
        table_column_count(self.element)
    }

    pub fn row_count(&self) -> usize {
        self.element.elements().filter(|e| e.is(TR)).count()
    }
}

/// A paragraph or a table, borrowed from the live body.
#[derive(Debug, Clone, Copy)]
pub enum Block<'a> {
    Paragraph(Paragraph<'a>),
    Table(Table<'a>),
}

impl<'a> Block<'a> {
    pub fn id(&self) -> BlockId {
        match self {
            Block::Paragraph(p) => p.id,
            Block::Table(t) => t.id,
        }
    }
}

#[derive(Debug, Clone)]
struct BodyChild {
    id: BlockId,
    node: Node,
}

/// Children of `w:body`, each with a stable identity.
#[derive(Debug, Clone)]
pub struct Body {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<BodyChild>,
    next_id: u64,
}

impl Body {
    pub fn from_element(body: Element) -> Self {
        let mut out = Self {
            name: body.name,
            attrs: body.attrs,
            children: Vec::with_capacity(body.children.len()),
            next_id: 0,
        };
        for node in body.children {
            let id = out.allocate();
            out.children.push(BodyChild { id, node });
        }
        out
    }

    pub fn to_element(&self) -> Element {
        Element {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
            children: self.children.iter().map(|c| c.node.clone()).collect(),
        }
    }

    fn allocate(&mut self) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        id
    }

    fn index_of(&self, id: BlockId) -> Option<usize> {
        self.children.iter().position(|c| c.id == id)
    }

    fn view(child: &BodyChild) -> Option<Block<'_>> {
        match &child.node {
            Node::Element(e) if e.is(P) => Some(Block::Paragraph(Paragraph {
                id: child.id,
                element: e,
            })),
            Node::Element(e) if e.is(TBL) => Some(Block::Table(Table {
                id: child.id,
                element: e,
            })),
            _ => None,
        }
    }

    /// Paragraphs and tables in document order.
    pub fn blocks(&self) -> impl Iterator<Item = Block<'_>> {
        self.children.iter().filter_map(Self::view)
    }

    /// Position of a block in the [`blocks`](Self::blocks) sequence.
    pub fn position(&self, id: BlockId) -> Option<usize> {
        self.blocks().position(|b| b.id() == id)
    }

    pub fn get(&self, id: BlockId) -> Option<Block<'_>> {
        self.children
            .iter()
            .find(|c| c.id == id)
            .and_then(Self::view)
    }

    /// Mutable access to a block's element.
    pub fn element_mut(&mut self, id: BlockId) -> Option<&mut Element> {
        self.children
            .iter_mut()
            .find(|c| c.id == id)
            .and_then(|c| match &mut c.node {
                Node::Element(e) if e.is(P) || e.is(TBL) => Some(e),
                _ => None,
            })
    }

    /// Removes a paragraph block. Returns `false` for unknown ids and tables.
    pub fn remove_paragraph(&mut self, id: BlockId) -> bool {
        match self.index_of(id) {
            Some(idx) if matches!(&self.children[idx].node, Node::Element(e) if e.is(P)) => {
                self.children.remove(idx);
                true
            }
            _ => false,
        }
    }

    /// Detaches a table and reinserts it immediately after a paragraph.
    pub fn move_table_after(&mut self, table: BlockId, paragraph: BlockId) -> bool {
        let is_table = |body: &Self, id: BlockId| {
            body.index_of(id)
                .map(|i| matches!(&body.children[i].node, Node::Element(e) if e.is(TBL)))
                .unwrap_or(false)
        };
        if !is_table(self, table) || self.index_of(paragraph).is_none() {
            return false;
        }
        let Some(from) = self.index_of(table) else {
            return false;
        };
        let child = self.children.remove(from);
        let Some(anchor) = self.index_of(paragraph) else {
            self.children.insert(from, child);
            return false;
        };
        self.children.insert(anchor + 1, child);
        true
    }

    /// Inserts a new body element right after `anchor`, returning its id.
    pub fn insert_after(&mut self, anchor: BlockId, element: Element) -> Option<BlockId> {
        let at = self.index_of(anchor)? + 1;
        let id = self.allocate();
        self.children.insert(
            at,
            BodyChild {
                id,
                node: Node::Element(element),
            },
        );
        Some(id)
    }

    /// Visits every paragraph of the body, including those nested in tables.
    pub fn for_each_paragraph_mut(&mut self, mut f: impl FnMut(&mut Element)) {
        for child in &mut self.children {
            if let Node::Element(e) = &mut child.node {
                e.walk_mut(&mut |el: &mut Element| {
                    if el.is(P) {
                        f(el);
                    }
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Paragraph helpers
// ---------------------------------------------------------------------------

fn collect_text(el: &Element, out: &mut String) {
    for child in el.elements() {
        match child.name.as_str() {
            "w:t" => out.push_str(&child.own_text()),
            "w:tab" => out.push('\t'),
            "w:br" | "w:cr" => {
                if child.attr("w:type").map_or(true, |t| t == "textWrapping") {
                    out.push('\n');
                }
            }
            "w:pPr" | "w:rPr" => {}
            _ => collect_text(child, out),
        }
    }
}

/// Visible text of a paragraph (tabs and line breaks included).
pub fn paragraph_text(p: &Element) -> String {
    let mut out = String::new();
    collect_text(p, &mut out);
    out
}

fn is_on(el: &Element) -> bool {
    !matches!(el.attr("w:val"), Some("0") | Some("false") | Some("off"))
}

/// Page break run, section properties, or page-break-before.
pub fn has_page_or_section_break(p: &Element) -> bool {
    if let Some(ppr) = p.child(PPR) {
        if ppr.child("w:sectPr").is_some() {
            return true;
        }
        if ppr.child("w:pageBreakBefore").is_some_and(is_on) {
            return true;
        }
    }
    p.elements().filter(|e| !e.is(PPR)).any(|e| {
        e.any_descendant(&|d: &Element| d.is(BR) && d.attr("w:type") == Some("page"))
    })
}

/// A run carrying `text`; newlines become `w:br`.
pub fn text_run(text: &str, rpr: Option<Element>) -> Element {
    let mut run = Element::new(R);
    if let Some(rpr) = rpr {
        run.children.push(Node::Element(rpr));
    }
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            run.children.push(Node::Element(Element::new(BR)));
        }
        if !line.is_empty() {
            run.children.push(Node::Element(
                Element::new(T)
                    .with_attr("xml:space", "preserve")
                    .with_text(line),
            ));
        }
    }
    run
}

/// Removes everything but `w:pPr`, returning the first run's properties.
fn strip_content(p: &mut Element) -> Option<Element> {
    let rpr = p
        .elements()
        .find(|e| e.is(R))
        .and_then(|r| r.child(RPR))
        .cloned();
    p.remove_children(|e| !e.is(PPR));
    p.children.retain(|n| matches!(n, Node::Element(_)));
    rpr
}

/// Replaces a paragraph's content with one run, keeping the first run's formatting.
pub fn set_paragraph_text(p: &mut Element, text: &str) {
    let rpr = strip_content(p);
    p.children.push(Node::Element(text_run(text, rpr)));
}

/// Empties a paragraph and appends a forced page break.
pub fn clear_with_page_break(p: &mut Element) {
    strip_content(p);
    p.children.push(Node::Element(
        Element::new(R).with_child(Element::new(BR).with_attr("w:type", "page")),
    ));
}

/// Replaces `from` by `to` inside a paragraph. Returns whether anything changed.
///
/// Matching runs over the concatenated `w:t` texts, so a token split across
/// runs is found too. Only the `w:t` elements an occurrence covers are
/// rewritten: run properties and every other run stay as they are.
pub fn replace_in_paragraph(p: &mut Element, from: &str, to: &str) -> bool {
    if from.is_empty() {
        return false;
    }
    let mut segments: Vec<String> = Vec::new();
    p.walk_mut(&mut |el: &mut Element| {
        if el.is(T) {
            segments.push(el.own_text());
        }
    });
    if !replace_across_segments(&mut segments, from, to) {
        return false;
    }
    let mut rewritten = segments.into_iter();
    p.walk_mut(&mut |el: &mut Element| {
        if el.is(T) {
            match rewritten.next() {
                Some(text) if text != el.own_text() => {
                    el.children = vec![Node::Text(text)];
                    el.set_attr("xml:space", "preserve");
                }
                _ => {}
            }
        }
    });
    true
}

/// Replaces every occurrence of `from` in the concatenation of `segments`.
///
/// The replacement goes into the segment where the occurrence starts; later
/// segments it covers keep only their text past the occurrence. Inserted
/// text is never searched again.
fn replace_across_segments(segments: &mut [String], from: &str, to: &str) -> bool {
    let mut replaced = false;
    let mut cursor = 0;
    loop {
        let joined = segments.concat();
        let Some(start) = joined
            .get(cursor..)
            .and_then(|rest| rest.find(from))
            .map(|i| cursor + i)
        else {
            break;
        };
        let end = start + from.len();
        let mut offset = 0;
        for seg in segments.iter_mut() {
            let (seg_start, seg_end) = (offset, offset + seg.len());
            offset = seg_end;
            if seg_end <= start || seg_start >= end {
                continue;
            }
            let tail = seg[end.min(seg_end) - seg_start..].to_string();
            *seg = if seg_start <= start {
                format!("{}{}{}", &seg[..start - seg_start], to, tail)
            } else {
                tail
            };
        }
        cursor = start + to.len();
        replaced = true;
    }
    replaced
}

/// Sets `w:spacing` before/after to zero.
pub fn zero_paragraph_spacing(p: &mut Element) {
    let ppr = p.ensure_child_at(PPR, 0);
    let spacing = ppr.ensure_child_before("w:spacing", SPACING_FOLLOWERS);
    spacing.set_attr("w:before", "0");
    spacing.set_attr("w:after", "0");
}

// ---------------------------------------------------------------------------
// Table helpers
// ---------------------------------------------------------------------------

fn rows(tbl: &Element) -> impl Iterator<Item = &Element> {
    tbl.elements().filter(|e| e.is(TR))
}

fn cells(tr: &Element) -> impl Iterator<Item = &Element> {
    tr.elements().filter(|e| e.is(TC))
}

fn cell_text(tc: &Element) -> String {
    tc.elements()
        .filter(|e| e.is(P))
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn table_cell_texts(tbl: &Element) -> Vec<Vec<String>> {
    rows(tbl)
        .map(|tr| cells(tr).map(cell_text).collect())
        .collect()
}

/// Grid column count, or the first row's cell count when the grid is empty.
pub fn table_column_count(tbl: &Element) -> usize {
    let grid = tbl
        .child(TBLGRID)
        .map(|g| g.elements().filter(|e| e.is("w:gridCol")).count())
        .unwrap_or(0);
    if grid > 0 {
        return grid;
    }
    rows(tbl).next().map(|tr| cells(tr).count()).unwrap_or(0)
}

/// Keeps the first row only.
pub fn truncate_to_header(tbl: &mut Element) {
    let mut seen_row = false;
    tbl.children.retain(|n| match n {
        Node::Element(e) if e.is(TR) => !std::mem::replace(&mut seen_row, true),
        _ => true,
    });
}

/// Replaces a cell's content with a single paragraph holding `text`.
pub fn set_cell_text(tc: &mut Element, text: &str) {
    let mut first = true;
    tc.children.retain(|n| match n {
        Node::Element(e) if e.is(TCPR) => true,
        Node::Element(e) if e.is(P) => std::mem::replace(&mut first, false),
        _ => false,
    });
    match tc.child_mut(P) {
        Some(p) => set_paragraph_text(p, text),
        None => {
            let mut p = Element::new(P);
            set_paragraph_text(&mut p, text);
            tc.children.push(Node::Element(p));
        }
    }
}

/// Writes `labels` into the header row, positionally, up to the existing cell count.
pub fn rewrite_header(tbl: &mut Element, labels: &[String]) {
    let Some(header) = tbl.elements_mut().find(|e| e.is(TR)) else {
        return;
    };
    for (tc, label) in header.elements_mut().filter(|e| e.is(TC)).zip(labels) {
        set_cell_text(tc, label);
    }
}

fn new_cell(text: &str, tcpr: Option<Element>, rpr: Option<Element>) -> Element {
    let mut tc = Element::new(TC);
    if let Some(tcpr) = tcpr {
        tc.children.push(Node::Element(tcpr));
    }
    let mut p = Element::new(P);
    if !text.is_empty() {
        p.children.push(Node::Element(text_run(text, rpr)));
    }
    tc.children.push(Node::Element(p));
    tc
}

/// Appends a data row with `columns` cells.
///
/// Each cell takes the width and shading of the header cell above it; merge
/// and border properties of the header stay on the header.
pub fn append_row(tbl: &mut Element, texts: &[String], columns: usize) {
    let header_tcpr: Vec<Option<Element>> = rows(tbl)
        .next()
        .map(|tr| cells(tr).map(|tc| tc.child(TCPR).and_then(data_cell_properties)).collect())
        .unwrap_or_default();
    let mut tr = Element::new(TR);
    for col in 0..columns {
        let text = texts.get(col).map(String::as_str).unwrap_or("");
        let tcpr = header_tcpr.get(col).cloned().flatten();
        tr.children.push(Node::Element(new_cell(text, tcpr, None)));
    }
    tbl.children.push(Node::Element(tr));
}

/// The `w:tcW` and `w:shd` of a header cell's properties, in schema order.
fn data_cell_properties(header: &Element) -> Option<Element> {
    let mut tcpr = Element::new(TCPR);
    for name in ["w:tcW", "w:shd"] {
        if let Some(child) = header.child(name) {
            tcpr.children.push(Node::Element(child.clone()));
        }
    }
    (!tcpr.children.is_empty()).then_some(tcpr)
}

/// `w:tcPr` children that follow `w:tcW`.
const TCW_FOLLOWERS: &[&str] = &[
    "w:gridSpan",
    "w:hMerge",
    "w:vMerge",
    "w:tcBorders",
    "w:shd",
    "w:noWrap",
    "w:tcMar",
    "w:textDirection",
    "w:tcFitText",
    "w:vAlign",
    "w:hideMark",
    "w:headers",
    "w:cellIns",
    "w:cellDel",
    "w:cellMerge",
    "w:tcPrChange",
];

const MERGE_PROPERTIES: &[&str] = &["w:gridSpan", "w:hMerge", "w:vMerge"];

fn grid_col(width: &str) -> Node {
    Node::Element(Element::new("w:gridCol").with_attr("w:w", width))
}

/// Reshapes a table's grid and header row to `columns` equal-width columns.
///
/// Surplus header cells are dropped and missing ones are cloned from the last
/// header cell. Header cells lose their merge properties. Rows below the
/// header are left untouched, so truncate first.
pub fn set_column_count(tbl: &mut Element, columns: usize) {
    let columns = columns.max(1);
    let width = (PAGE_TEXT_WIDTH / columns).to_string();

    let mut grid = Element::new(TBLGRID);
    for _ in 0..columns {
        grid.children.push(grid_col(&width));
    }
    match tbl.child_mut(TBLGRID) {
        Some(existing) => *existing = grid,
        None => {
            let at = tbl
                .children
                .iter()
                .position(|n| matches!(n, Node::Element(e) if e.is(TBLPR)))
                .map_or(0, |i| i + 1);
            tbl.children.insert(at, Node::Element(grid));
        }
    }

    let Some(header) = tbl.elements_mut().find(|e| e.is(TR)) else {
        return;
    };
    let mut kept = 0;
    header.children.retain(|n| match n {
        Node::Element(e) if e.is(TC) => {
            kept += 1;
            kept <= columns
        }
        _ => true,
    });
    let filler = header
        .elements()
        .filter(|e| e.is(TC))
        .last()
        .cloned()
        .unwrap_or_else(|| new_cell("", None, None));
    for _ in kept.min(columns)..columns {
        header.children.push(Node::Element(filler.clone()));
    }

    for tc in header.elements_mut().filter(|e| e.is(TC)) {
        let tcpr = tc.ensure_child_at(TCPR, 0);
        tcpr.remove_children(|e| MERGE_PROPERTIES.iter().any(|m| e.is(m)));
        let tcw = tcpr.ensure_child_before("w:tcW", TCW_FOLLOWERS);
        tcw.set_attr("w:w", width.as_str());
        tcw.set_attr("w:type", "dxa");
    }
}

/// Total text width of an A4 portrait page with 2 cm margins, in twips.
const PAGE_TEXT_WIDTH: usize = 9638;

/// A new table with one bold header row.
pub fn new_table(labels: &[String], style: &str) -> Element {
    let columns = labels.len().max(1);
    let width = (PAGE_TEXT_WIDTH / columns).to_string();

    let tblpr = Element::new(TBLPR)
        .with_child(Element::new("w:tblStyle").with_attr("w:val", style))
        .with_child(
            Element::new("w:tblW")
                .with_attr("w:w", "0")
                .with_attr("w:type", "auto"),
        )
        .with_child(
            Element::new("w:tblLook")
                .with_attr("w:val", "04A0")
                .with_attr("w:firstRow", "1")
                .with_attr("w:lastRow", "0")
                .with_attr("w:firstColumn", "1")
                .with_attr("w:lastColumn", "0")
                .with_attr("w:noHBand", "0")
                .with_attr("w:noVBand", "1"),
        );

    let mut grid = Element::new(TBLGRID);
    for _ in 0..columns {
        grid.children.push(grid_col(&width));
    }

    let mut header = Element::new(TR)
        .with_child(Element::new("w:trPr").with_child(Element::new("w:tblHeader")));
    for label in labels {
        let tcpr = Element::new(TCPR).with_child(
            Element::new("w:tcW")
                .with_attr("w:w", width.as_str())
                .with_attr("w:type", "dxa"),
        );
        let bold = Element::new(RPR).with_child(Element::new("w:b"));
        header
            .children
            .push(Node::Element(new_cell(label, Some(tcpr), Some(bold))));
    }

    Element::new(TBL)
        .with_child(tblpr)
        .with_child(grid)
        .with_child(header)
}

/// Sets the table style name.
pub fn set_table_style(tbl: &mut Element, style: &str) {
    let tblpr = tbl.ensure_child_at(TBLPR, 0);
    tblpr
        .ensure_child_at("w:tblStyle", 0)
        .set_attr("w:val", style);
}

/// Zero spacing before/after for every paragraph inside the table's cells.
pub fn zero_cell_spacing(tbl: &mut Element) {
    for tr in tbl.elements_mut().filter(|e| e.is(TR)) {
        for tc in tr.elements_mut().filter(|e| e.is(TC)) {
            for p in tc.elements_mut().filter(|e| e.is(P)) {
                zero_paragraph_spacing(p);
            }
        }
    }
}
