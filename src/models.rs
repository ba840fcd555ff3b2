//! Core data types shared by extraction and document synthesis.
//!
//! These types represent the canonical line items, the archive candidates
//! they are read from, and the raw grids produced by the tabular readers.

use serde::{Deserialize, Serialize};

/// The seven normalized line-item attributes, in canonical column order.
///
/// Declaration order matters: the schema resolver scans fields in this order
/// and generated tables lay their columns out in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Reference,
    Dimension,
    Typology,
    Performance,
    Quantity,
    InstallMode,
    Comment,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::Reference,
        CanonicalField::Dimension,
        CanonicalField::Typology,
        CanonicalField::Performance,
        CanonicalField::Quantity,
        CanonicalField::InstallMode,
        CanonicalField::Comment,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Column position in the canonical layout.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Header label written into generated tables.
    pub fn label(self) -> &'static str {
        match self {
            CanonicalField::Reference => "Repère",
            CanonicalField::Dimension => "Dimensions",
            CanonicalField::Typology => "Typologie",
            CanonicalField::Performance => "Performances",
            CanonicalField::Quantity => "Quantité",
            CanonicalField::InstallMode => "Mode de pose",
            CanonicalField::Comment => "Observations",
        }
    }

    /// Parses the snake_case name used in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "reference" => Some(CanonicalField::Reference),
            "dimension" => Some(CanonicalField::Dimension),
            "typology" => Some(CanonicalField::Typology),
            "performance" => Some(CanonicalField::Performance),
            "quantity" => Some(CanonicalField::Quantity),
            "install_mode" | "installmode" => Some(CanonicalField::InstallMode),
            "comment" => Some(CanonicalField::Comment),
            _ => None,
        }
    }
}

/// Header labels in canonical column order.
pub fn canonical_labels() -> Vec<String> {
    CanonicalField::ALL
        .iter()
        .map(|f| f.label().to_string())
        .collect()
}

/// One row of the quantitative table.
///
/// `typology` is never empty for an item produced by the row normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub reference: String,
    pub dimension: String,
    pub typology: String,
    pub performance: String,
    pub quantity: i64,
    pub install_mode: String,
    pub comment: String,
}

impl LineItem {
    /// Cell texts in canonical column order.
    pub fn cells(&self) -> [String; CanonicalField::COUNT] {
        [
            self.reference.clone(),
            self.dimension.clone(),
            self.typology.clone(),
            self.performance.clone(),
            self.quantity.to_string(),
            self.install_mode.clone(),
            self.comment.clone(),
        ]
    }
}

/// An archive entry considered as the quantitative table source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFile {
    pub name: String,
    pub extension: String,
    pub match_score: u32,
}

/// A header row plus data rows, as read from a CSV file or a worksheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Worksheet name for spreadsheets, `None` for delimited text.
    pub sheet: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_follow_canonical_order() {
        let item = LineItem {
            reference: "F1".into(),
            dimension: "1200x1000".into(),
            typology: "Fenêtre PVC".into(),
            performance: "Uw = 1,3 W/m².K".into(),
            quantity: 4,
            install_mode: "Applique".into(),
            comment: "RAL 9010".into(),
        };
        let cells = item.cells();
        assert_eq!(cells[CanonicalField::Typology.index()], "Fenêtre PVC");
        assert_eq!(cells[CanonicalField::Quantity.index()], "4");
        assert_eq!(cells[CanonicalField::Comment.index()], "RAL 9010");
    }

    #[test]
    fn field_names_parse_from_config_spelling() {
        assert_eq!(
            CanonicalField::from_name("install_mode"),
            Some(CanonicalField::InstallMode)
        );
        assert_eq!(
            CanonicalField::from_name(" Performance "),
            Some(CanonicalField::Performance)
        );
        assert_eq!(CanonicalField::from_name("unit"), None);
    }
}
