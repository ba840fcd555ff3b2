//! Free-text inference rules for dimensions and performances.
//!
//! When a table has no dimension or performance column, those fields are
//! recovered from the designation text. The rules are an ordered list of
//! pattern → field entries carried as a versioned value, so new notations can
//! be added (including from configuration) without touching the row
//! normalizer.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::CanonicalField;

/// Version tag of the built-in rule set.
pub const BUILTIN_RULES_VERSION: &str = "2024.1";

static BUILTIN: LazyLock<PatternRules> = LazyLock::new(PatternRules::compile_builtin);

/// Separator placed between several hits for the same field.
pub const HIT_SEPARATOR: &str = " / ";

/// How a regex match is turned into field text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Render {
    /// The matched text with inner whitespace collapsed.
    Verbatim,
    /// Two captured numbers rendered as `<a>x<b>`.
    Pair,
}

#[derive(Debug, Clone)]
pub struct PatternRule {
    pub field: CanonicalField,
    pub name: String,
    regex: Regex,
    render: Render,
}

impl PatternRule {
    pub fn new(
        field: CanonicalField,
        name: impl Into<String>,
        pattern: &str,
        render: Render,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            field,
            name: name.into(),
            regex: Regex::new(pattern)?,
            render,
        })
    }

    fn hits<'t>(&'t self, text: &'t str) -> impl Iterator<Item = String> + 't {
        self.regex.captures_iter(text).filter_map(move |caps| match self.render {
            Render::Verbatim => caps.get(0).map(|m| collapse_whitespace(m.as_str())),
            Render::Pair => match (caps.get(1), caps.get(2)) {
                (Some(a), Some(b)) => Some(format!("{}x{}", a.as_str(), b.as_str())),
                _ => None,
            },
        })
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// An ordered, versioned set of inference rules.
#[derive(Debug, Clone)]
pub struct PatternRules {
    version: String,
    rules: Vec<PatternRule>,
}

impl PatternRules {
    pub fn new(version: impl Into<String>, rules: Vec<PatternRule>) -> Self {
        Self {
            version: version.into(),
            rules,
        }
    }

    /// Dimensions (`1200x1000`), fire ratings (`EI 30`), acoustic
    /// attenuation (`Ra,tr = 30 dB`) and thermal transmittance (`Uw 1,3 W/m².K`).
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    fn compile_builtin() -> Self {
        let specs: [(CanonicalField, &str, &str, Render); 4] = [
            (
                CanonicalField::Dimension,
                "dimension",
                r"\b(\d{3,4})\s*[xX×*]\s*(\d{3,4})\b",
                Render::Pair,
            ),
            (
                CanonicalField::Performance,
                "fire-rating",
                r"\b(?:REI|EI|RE|EW|E|R)\s?(?:15|30|45|60|90|120|180|240)\b",
                Render::Verbatim,
            ),
            (
                CanonicalField::Performance,
                "acoustic",
                r"(?i)(?:\bR\s?[aw](?:\s?,\s?tr)?\s*[=:]?\s*)?\b\d{2}(?:[.,]\d)?\s?dB\b",
                Render::Verbatim,
            ),
            (
                CanonicalField::Performance,
                "thermal",
                r"(?i)\bU[wgf]\s*[=:<≤]?\s*\d(?:[.,]\d{1,2})?\s*W\s*/\s*\(?m[²2]\s*[.·]?\s*K\)?",
                Render::Verbatim,
            ),
        ];
        let rules = specs
            .into_iter()
            .map(|(field, name, pattern, render)| {
                PatternRule::new(field, name, pattern, render)
                    .expect("valid built-in pattern rule")
            })
            .collect();
        Self::new(BUILTIN_RULES_VERSION, rules)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Appends a rule after the existing ones.
    pub fn push(&mut self, rule: PatternRule) {
        self.rules.push(rule);
    }

    /// All hits for `field` in rule order, de-duplicated, joined with [`HIT_SEPARATOR`].
    pub fn infer(&self, field: CanonicalField, text: &str) -> String {
        let mut hits: Vec<String> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.field == field) {
            for hit in rule.hits(text) {
                if !hits.contains(&hit) {
                    hits.push(hit);
                }
            }
        }
        hits.join(HIT_SEPARATOR)
    }
}

impl Default for PatternRules {
    fn default() -> Self {
        Self::builtin()
    }
}
