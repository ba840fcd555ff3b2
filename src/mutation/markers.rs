//! Marker tokens and their lookup in the block sequence.

use crate::docx::{Block, BlockId, Body};

pub const DEFAULT_DESCRIPTIVE_MARKER: &str = "DESCRIPTIF";
pub const DEFAULT_QUANTITATIVE_MARKER: &str = "TABLEAU_QUANTITATIF";

/// A named marker, recognized as `[NAME]` or `{{NAME}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSpec {
    name: String,
    tokens: [String; 2],
}

impl MarkerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let tokens = [format!("[{}]", name), format!("{{{{{}}}}}", name)];
        Self { name, tokens }
    }

    pub fn descriptive() -> Self {
        Self::new(DEFAULT_DESCRIPTIVE_MARKER)
    }

    pub fn quantitative() -> Self {
        Self::new(DEFAULT_QUANTITATIVE_MARKER)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Substring containment of either token.
    pub fn matches(&self, text: &str) -> bool {
        self.tokens.iter().any(|t| text.contains(t.as_str()))
    }
}

/// First body paragraph carrying the marker.
pub fn find_marker(body: &Body, marker: &MarkerSpec) -> Option<BlockId> {
    body.blocks().find_map(|b| match b {
        Block::Paragraph(p) if marker.matches(&p.text()) => Some(p.id()),
        _ => None,
    })
}
