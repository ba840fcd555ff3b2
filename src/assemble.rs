//! Document synthesis: template + [`ConsultationRequest`] → `.docx` bytes.
//!
//! Steps run in a fixed order on a freshly loaded copy of the template:
//! base font normalization, placeholder substitution, descriptive marker,
//! quantitative table mutation, serialization. Nothing is written before the
//! last step, and every failure propagates unchanged.

use chrono::{Local, NaiveDate};
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::docx::blocks::{paragraph_text, replace_in_paragraph, set_paragraph_text};
use crate::docx::styles::set_base_font;
use crate::docx::{Body, DocxPackage};
use crate::error::Result;
use crate::mutation::{mutate_table, replace_descriptive_marker, TableOutcome};
use crate::request::ConsultationRequest;

/// Legacy first-page line rewritten to carry the project name.
pub const REFERENCE_LINE: &str = "REFERENCE CHANTIER";

/// What a build changed in the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub base_font_applied: bool,
    pub placeholders_replaced: usize,
    pub descriptive_resolved: bool,
    pub table: TableOutcome,
}

/// `{{KEY}}` → value pairs for a request and build date.
pub fn placeholders(request: &ConsultationRequest, date: NaiveDate) -> Vec<(String, String)> {
    vec![
        ("{{PROJET}}".to_string(), request.project.clone()),
        ("{{LOT}}".to_string(), request.lot.clone()),
        (
            "{{CLIENT}}".to_string(),
            request.client.clone().unwrap_or_default(),
        ),
        ("{{DATE}}".to_string(), date.format("%d/%m/%Y").to_string()),
    ]
}

/// Substitutes placeholders in every paragraph, table cells included.
///
/// Returns the number of paragraphs changed.
fn substitute_placeholders(body: &mut Body, pairs: &[(String, String)], project: &str) -> usize {
    let mut changed = 0;
    let mut reference_done = false;
    body.for_each_paragraph_mut(|p| {
        let mut hit = false;
        for (key, value) in pairs {
            hit |= replace_in_paragraph(p, key, value);
        }
        if !reference_done && paragraph_text(p).contains(REFERENCE_LINE) {
            set_paragraph_text(p, &format!("{} : {}", REFERENCE_LINE, project));
            reference_done = true;
            hit = true;
        }
        if hit {
            changed += 1;
        }
    });
    changed
}

/// Builds the consultation document, dated today.
pub fn build_document(
    request: &ConsultationRequest,
    template: &[u8],
    config: &Config,
) -> Result<Vec<u8>> {
    build_document_on(request, template, config, Local::now().date_naive()).map(|(bytes, _)| bytes)
}

/// Builds the consultation document for a given build date.
#[instrument(skip_all, fields(project = %request.project, lot = %request.lot, items = request.items.len()))]
pub fn build_document_on(
    request: &ConsultationRequest,
    template: &[u8],
    config: &Config,
    date: NaiveDate,
) -> Result<(Vec<u8>, BuildReport)> {
    let mut package = DocxPackage::from_bytes(template)?;

    let base_font_applied = match package.styles_mut() {
        Some(styles) => set_base_font(
            styles,
            &config.template.base_font,
            config.template.base_font_size_pt,
        ),
        None => false,
    };
    if !base_font_applied {
        debug!("no default paragraph style, base font left as is");
    }

    let pairs = placeholders(request, date);
    let placeholders_replaced =
        substitute_placeholders(package.body_mut(), &pairs, &request.project);

    let descriptive_resolved = replace_descriptive_marker(
        package.body_mut(),
        &config.descriptive_marker(),
        &request.descriptive,
    );

    let table = mutate_table(
        package.body_mut(),
        &config.quantitative_marker(),
        &request.items,
        &config.table_options(),
    );

    let bytes = package.to_bytes()?;
    let report = BuildReport {
        base_font_applied,
        placeholders_replaced,
        descriptive_resolved,
        table,
    };
    info!(?report, bytes = bytes.len(), "document built");
    Ok((bytes, report))
}
