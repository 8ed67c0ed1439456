//! Typed errors raised while validating inputs, before any computation starts.
//!
//! Public operations in this crate return [`anyhow::Result`]; the variants below are wrapped
//! into it and can be recovered with [`anyhow::Error::downcast_ref`].

use std::path::PathBuf;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum EnrichmentError {
    #[error("Gene set file not found: {path:?}")]
    GmtNotFound { path: PathBuf },

    #[error("Malformed GMT record at line {line}: {reason}")]
    GmtParse { line: usize, reason: String },

    #[error("Column '{column}' not found in cell meta data")]
    MissingColumn { column: String },

    #[error("Threshold `{name}` must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("Parameter `{name}` is invalid: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Expression matrix has {matrix} cells but meta data describes {metadata}")]
    CellCountMismatch { matrix: usize, metadata: usize },

    #[error("Invalid expression matrix: {0}")]
    InvalidMatrix(String),

    #[error("Value '{value}' is not one of the declared levels of column '{column}'")]
    UnknownLevel { column: String, value: String },

    #[error("No gene set has members among the expressed genes")]
    EmptyGeneSetCollection,
}

/// Checks that a significance threshold lies within `[0, 1]`.
pub(crate) fn check_threshold(name: &'static str, value: f64) -> Result<(), EnrichmentError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EnrichmentError::ThresholdOutOfRange { name, value })
    }
}
