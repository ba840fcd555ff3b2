//! Consultation requests and display-field resolution.
//!
//! Project name, lot and client come from the caller first, then from a
//! `projet.toml` / `metadata.toml` entry bundled in the archive, then from
//! the archive's file name (`DCE_Residence_Les_Pins_Lot5.zip` gives project
//! "Residence Les Pins" and lot "5"). Project and lot are required; the
//! client is optional.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::archive::{base_name, ArchiveBundle};
use crate::error::{DceError, Result};
use crate::models::LineItem;

/// Bundled metadata file names, compared case-insensitively.
pub const METADATA_ENTRIES: &[&str] = &["projet.toml", "metadata.toml"];

/// Display fields as far as they are known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFields {
    pub project: Option<String>,
    pub lot: Option<String>,
    pub client: Option<String>,
}

impl DisplayFields {
    /// Fills fields still missing from `other`.
    fn or(self, other: DisplayFields) -> DisplayFields {
        DisplayFields {
            project: self.project.or(other.project),
            lot: self.lot.or(other.lot),
            client: self.client.or(other.client),
        }
    }

    fn cleaned(self) -> DisplayFields {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        DisplayFields {
            project: clean(self.project),
            lot: clean(self.lot),
            client: clean(self.client),
        }
    }
}

/// Everything document synthesis needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsultationRequest {
    pub project: String,
    pub lot: String,
    pub client: Option<String>,
    pub descriptive: String,
    pub items: Vec<LineItem>,
    /// Archive entry the items were read from.
    pub source: Option<String>,
}

impl ConsultationRequest {
    pub fn new(project: impl Into<String>, lot: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            lot: lot.into(),
            client: None,
            descriptive: String::new(),
            items: Vec::new(),
            source: None,
        }
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn with_descriptive(mut self, text: impl Into<String>) -> Self {
        self.descriptive = text.into();
        self
    }

    pub fn with_items(mut self, items: Vec<LineItem>, source: Option<String>) -> Self {
        self.items = items;
        self.source = source;
        self
    }
}

#[derive(Debug, Deserialize)]
struct BundledMetadata {
    #[serde(default, alias = "project")]
    projet: Option<toml::Value>,
    #[serde(default)]
    lot: Option<toml::Value>,
    #[serde(default)]
    client: Option<toml::Value>,
}

fn scalar_text(value: Option<toml::Value>) -> Option<String> {
    match value? {
        toml::Value::String(s) => Some(s),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        _ => None,
    }
}

/// Display fields from a bundled metadata entry, if any parses.
pub fn metadata_fields(bundle: &ArchiveBundle) -> DisplayFields {
    let entry = bundle.names().find(|n| {
        let base = base_name(n).to_lowercase();
        METADATA_ENTRIES.contains(&base.as_str())
    });
    let Some(name) = entry else {
        return DisplayFields::default();
    };
    let Some(bytes) = bundle.get(name) else {
        return DisplayFields::default();
    };
    let parsed = std::str::from_utf8(bytes)
        .map_err(|e| e.to_string())
        .and_then(|text| toml::from_str::<BundledMetadata>(text).map_err(|e| e.to_string()));
    match parsed {
        Ok(meta) => {
            debug!(entry = name, "bundled metadata read");
            DisplayFields {
                project: scalar_text(meta.projet),
                lot: scalar_text(meta.lot),
                client: scalar_text(meta.client),
            }
            .cleaned()
        }
        Err(e) => {
            warn!(entry = name, error = %e, "bundled metadata ignored");
            DisplayFields::default()
        }
    }
}

static LOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z])(lot[ _-]?(\d+))").expect("valid lot regex")
});

static DCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[ _-])dce(?:$|[ _-])").expect("valid dce regex"));

/// Project and lot inferred from an archive file name.
pub fn infer_from_file_name(file_name: &str) -> DisplayFields {
    let base = base_name(file_name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };

    let mut rest = stem.to_string();
    let mut lot = None;
    if let Some(caps) = LOT_RE.captures(stem) {
        lot = caps.get(2).map(|m| m.as_str().to_string());
        if let Some(token) = caps.get(1) {
            rest.replace_range(token.range(), " ");
        }
    }
    let rest = DCE_RE.replace_all(&rest, " ").into_owned();
    let project = rest
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    DisplayFields {
        project: Some(project),
        lot,
        client: None,
    }
    .cleaned()
}

/// Resolves display fields: caller, then bundled metadata, then file name.
pub fn resolve_display_fields(caller: DisplayFields, bundle: &ArchiveBundle) -> Result<DisplayFields> {
    let inferred = bundle
        .source_name()
        .map(infer_from_file_name)
        .unwrap_or_default();
    let fields = caller
        .cleaned()
        .or(metadata_fields(bundle))
        .or(inferred);

    if fields.project.is_none() {
        return Err(DceError::MissingRequiredField { field: "project" });
    }
    if fields.lot.is_none() {
        return Err(DceError::MissingRequiredField { field: "lot" });
    }
    Ok(fields)
}

/// Builds a request from resolved fields and extracted items.
pub fn build_request(
    caller: DisplayFields,
    bundle: &ArchiveBundle,
    descriptive: impl Into<String>,
    items: Vec<LineItem>,
    source: Option<String>,
) -> Result<ConsultationRequest> {
    let fields = resolve_display_fields(caller, bundle)?;
    let (Some(project), Some(lot)) = (fields.project, fields.lot) else {
        return Err(DceError::MissingRequiredField { field: "project" });
    };
    let mut request = ConsultationRequest::new(project, lot)
        .with_descriptive(descriptive)
        .with_items(items, source);
    request.client = fields.client;
    Ok(request)
}
