//! TOML configuration.
//!
//! Every section is optional; an empty file (or no file at all) yields
//! [`Config::default`]. Example:
//!
//! ```toml
//! [template]
//! path = "templates/fiche.docx"
//! table_style = "TableGrid"
//! base_font = "Calibri"
//! base_font_size_pt = 10
//!
//! [markers]
//! descriptive = "DESCRIPTIF"
//! quantitative = "TABLEAU_QUANTITATIF"
//!
//! [selector]
//! keywords = ["dqe", "dpgf", "bordereau"]
//!
//! [mutation]
//! purge_prefixes = ["Tableau récapitulatif"]
//! empty_notice = "Aucune donnée trouvée dans le DPGF."
//!
//! [[patterns.rules]]
//! field = "performance"
//! pattern = "(?i)\\bA2-s1,?\\s*d0\\b"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::DceError;
use crate::models::CanonicalField;
use crate::mutation::{MarkerSpec, PurgeRules, TableOptions};
use crate::patterns::{PatternRule, PatternRules, Render};
use crate::selector::{CandidateSelector, DEFAULT_KEYWORDS};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub template: TemplateConfig,
    #[serde(default)]
    pub markers: MarkersConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub mutation: MutationConfig,
    #[serde(default)]
    pub patterns: PatternsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TemplateConfig {
    /// Template `.docx`; relative paths resolve against the config file.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_table_style")]
    pub table_style: String,
    #[serde(default = "default_base_font")]
    pub base_font: String,
    #[serde(default = "default_base_font_size")]
    pub base_font_size_pt: u32,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            path: None,
            table_style: default_table_style(),
            base_font: default_base_font(),
            base_font_size_pt: default_base_font_size(),
        }
    }
}

fn default_table_style() -> String {
    "TableGrid".to_string()
}
fn default_base_font() -> String {
    "Calibri".to_string()
}
fn default_base_font_size() -> u32 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarkersConfig {
    #[serde(default = "default_descriptive")]
    pub descriptive: String,
    #[serde(default = "default_quantitative")]
    pub quantitative: String,
}

impl Default for MarkersConfig {
    fn default() -> Self {
        Self {
            descriptive: default_descriptive(),
            quantitative: default_quantitative(),
        }
    }
}

fn default_descriptive() -> String {
    crate::mutation::markers::DEFAULT_DESCRIPTIVE_MARKER.to_string()
}
fn default_quantitative() -> String {
    crate::mutation::markers::DEFAULT_QUANTITATIVE_MARKER.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SelectorConfig {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MutationConfig {
    /// Extra header-label tokens purged after the quantitative marker.
    #[serde(default)]
    pub purge_prefixes: Vec<String>,
    /// Written in place of the table when no line item was extracted.
    #[serde(default)]
    pub empty_notice: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PatternsConfig {
    /// Appended after the built-in rules.
    #[serde(default)]
    pub rules: Vec<PatternRuleConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatternRuleConfig {
    pub field: String,
    pub pattern: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl PatternRuleConfig {
    fn compile(&self, index: usize) -> Result<PatternRule, DceError> {
        let field = CanonicalField::from_name(&self.field)
            .filter(|f| matches!(f, CanonicalField::Dimension | CanonicalField::Performance))
            .ok_or_else(|| DceError::Config {
                message: format!(
                    "patterns.rules[{}].field must be 'dimension' or 'performance', got '{}'",
                    index, self.field
                ),
            })?;
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("custom-{}", index));
        PatternRule::new(field, name, &self.pattern, Render::Verbatim).map_err(|e| {
            DceError::Config {
                message: format!("patterns.rules[{}].pattern: {}", index, e),
            }
        })
    }
}

impl Config {
    /// Built-in rules followed by the configured ones.
    pub fn pattern_rules(&self) -> Result<PatternRules, DceError> {
        let mut rules = PatternRules::builtin();
        for (i, rule) in self.patterns.rules.iter().enumerate() {
            rules.push(rule.compile(i)?);
        }
        Ok(rules)
    }

    pub fn selector(&self) -> CandidateSelector {
        CandidateSelector::new(&self.selector.keywords)
    }

    pub fn descriptive_marker(&self) -> MarkerSpec {
        MarkerSpec::new(self.markers.descriptive.trim())
    }

    pub fn quantitative_marker(&self) -> MarkerSpec {
        MarkerSpec::new(self.markers.quantitative.trim())
    }

    pub fn table_options(&self) -> TableOptions {
        TableOptions {
            purge: PurgeRules::new(&self.mutation.purge_prefixes),
            style: self.template.table_style.clone(),
            empty_notice: self
                .mutation
                .empty_notice
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        }
    }
}

/// Checks cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    let descriptive = config.markers.descriptive.trim();
    let quantitative = config.markers.quantitative.trim();
    if descriptive.is_empty() || quantitative.is_empty() {
        anyhow::bail!("markers.descriptive and markers.quantitative must be non-empty");
    }
    if descriptive == quantitative {
        anyhow::bail!(
            "markers.descriptive and markers.quantitative must differ (both are '{}')",
            descriptive
        );
    }

    if !(6..=72).contains(&config.template.base_font_size_pt) {
        anyhow::bail!("template.base_font_size_pt must be in [6, 72]");
    }
    if config.template.base_font.trim().is_empty() {
        anyhow::bail!("template.base_font must be non-empty");
    }
    if config.template.table_style.trim().is_empty() {
        anyhow::bail!("template.table_style must be non-empty");
    }

    if config.selector.keywords.iter().all(|k| k.trim().is_empty()) {
        anyhow::bail!("selector.keywords must contain at least one keyword");
    }

    config.pattern_rules()?;
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if let Some(template) = config.template.path.as_mut() {
        if template.is_relative() {
            if let Some(dir) = path.parent() {
                *template = dir.join(&*template);
            }
        }
    }

    validate(&config)?;
    Ok(config)
}
