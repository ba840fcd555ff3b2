//! Error taxonomy for archive extraction and document synthesis.
//!
//! Every fatal condition aborts the current build and surfaces as a single
//! [`DceError`]. Per-row problems (bad quantity, unmatched header) are
//! recovered locally by the normalizer and never reach this type. An absent
//! marker is not an error at all.

/// Top-level error type for all library operations.
#[derive(Debug, thiserror::Error)]
pub enum DceError {
    /// The input is not a valid container, or a required internal part is missing.
    #[error("input format error: {message}")]
    InputFormat { message: String },

    /// No archive entry looks like a quantitative table.
    #[error("no quantitative table candidate found among {entries} archive entries")]
    CandidateNotFound { entries: usize },

    /// A candidate was parsed but every row was discarded.
    #[error("no usable rows in candidate '{candidate}'")]
    NoUsableRows { candidate: String },

    /// A display field could not be resolved from input, metadata, or file name.
    #[error("missing required field: {field}")]
    MissingRequiredField { field: &'static str },

    /// XML parsing or serialization failure inside an OOXML part.
    #[error("XML error in {part}: {message}")]
    Xml { part: String, message: String },

    /// CSV or spreadsheet decoding failure.
    #[error("tabular decode error in '{name}': {message}")]
    Tabular { name: String, message: String },

    /// Invalid configuration value reaching the library (e.g. a pattern that does not compile).
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DceError>;

impl DceError {
    pub fn input_format(msg: impl Into<String>) -> Self {
        Self::InputFormat {
            message: msg.into(),
        }
    }

    pub fn xml(part: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Xml {
            part: part.into(),
            message: msg.to_string(),
        }
    }

    pub fn tabular(name: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Tabular {
            name: name.into(),
            message: msg.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for DceError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::input_format(err.to_string())
    }
}
