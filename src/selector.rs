//! Picks the archive entry most likely to hold the quantitative table.
//!
//! Entries with an accepted tabular extension score 10; a file name that also
//! contains a bill-of-quantities keyword scores 100. Ties go to the shorter
//! name, then to the entry seen first. The result is a heuristic: a selected
//! candidate may still yield no usable rows.

use tracing::{debug, instrument};

use crate::archive::{base_name, extension};
use crate::models::CandidateFile;
use crate::schema::normalize_header;

/// Delimited-text and spreadsheet extensions.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xlsm", "xls", "ods"];

pub const KEYWORD_SCORE: u32 = 100;
pub const EXTENSION_SCORE: u32 = 10;

/// Built-in bill-of-quantities synonyms, in normalized form.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "quantitatif",
    "quantites",
    "quantite",
    "dqe",
    "bpu",
    "metre",
    "bordereau",
    "boq",
    "bill of quantities",
];

/// Candidate scoring with a configurable keyword set.
#[derive(Debug, Clone)]
pub struct CandidateSelector {
    keywords: Vec<String>,
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS.iter().copied())
    }
}

fn is_ignored(name: &str) -> bool {
    name.starts_with("__MACOSX/") || base_name(name).starts_with("~$")
}

impl CandidateSelector {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| normalize_header(k.as_ref()))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Scores one entry; `None` when its extension is not tabular.
    pub fn score(&self, name: &str) -> Option<CandidateFile> {
        if is_ignored(name) {
            return None;
        }
        let ext = extension(name)?;
        if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
            return None;
        }
        // Keywords must start on a token boundary ("parametres" is not "metre").
        let padded = format!(" {}", normalize_header(base_name(name)));
        let keyword_hit = self
            .keywords
            .iter()
            .any(|k| padded.contains(&format!(" {}", k)));
        Some(CandidateFile {
            name: name.to_string(),
            extension: ext,
            match_score: if keyword_hit {
                KEYWORD_SCORE
            } else {
                EXTENSION_SCORE
            },
        })
    }

    /// All scored candidates, best first (stable on ties).
    pub fn rank<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<CandidateFile> {
        let mut candidates: Vec<CandidateFile> =
            names.into_iter().filter_map(|n| self.score(n)).collect();
        candidates.sort_by(|a, b| {
            b.match_score
                .cmp(&a.match_score)
                .then_with(|| a.name.chars().count().cmp(&b.name.chars().count()))
        });
        candidates
    }

    /// The single best candidate, or `None` when no entry is tabular.
    #[instrument(skip_all)]
    pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Option<CandidateFile> {
        let best = self.rank(names).into_iter().next();
        match &best {
            Some(c) => debug!(name = %c.name, score = c.match_score, "candidate selected"),
            None => debug!("no tabular candidate"),
        }
        best
    }
}
