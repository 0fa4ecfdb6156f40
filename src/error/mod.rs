//! Error handling for the cohort pipeline.

use std::path::PathBuf;

/// Errors that can occur while building the cohort
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error opening or reading a file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reading or writing tabular data
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error reading a review workbook
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::XlsxError),

    /// A named worksheet is missing from a workbook
    #[error("Worksheet '{sheet}' not found in {path}")]
    SheetNotFound {
        /// Name of the requested sheet
        sheet: String,
        /// Workbook the sheet was expected in
        path: PathBuf,
    },

    /// A required column is missing from a record batch
    #[error("Column '{column}' not found in record batch")]
    ColumnNotFound {
        /// Name of the missing column
        column: String,
    },

    /// A column holds a different type than the caller expected
    #[error("Column '{column}' is not of expected type {expected}")]
    InvalidDataType {
        /// Name of the offending column
        column: String,
        /// Human-readable name of the expected type
        expected: String,
    },

    /// A transfer manifest line did not split into the expected fields
    #[error("Malformed manifest line {line} in {path}: {reason}")]
    Manifest {
        /// Manifest file being parsed
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        reason: String,
    },

    /// Error evaluating a filter expression
    #[error("Filter error: {0}")]
    Filter(String),

    /// Error converting between record batches and typed records
    #[error("Record conversion error: {0}")]
    Conversion(#[from] serde_arrow::Error),

    /// Any other error, with context attached
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for cohort pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a filter evaluation error
    pub fn filter(msg: impl Into<String>) -> Self {
        Self::Filter(msg.into())
    }
}
