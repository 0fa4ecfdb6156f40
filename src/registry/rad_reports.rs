//! Annotated radiology report loader
//!
//! The report export comes from the annotation tool as a spreadsheet;
//! every row is one report with 0/1 keyword-hit flags from the
//! keyword-matching pass.

use std::path::Path;

use arrow::record_batch::RecordBatch;

use crate::accession::strip_modality_markers;
use crate::error::Result;
use crate::models::KeywordFlags;
use crate::registry::schemas::rad_reports_schema;
use crate::registry::warn_missing_columns;
use crate::utils::arrow::{extract_bool_flag, extract_string};
use crate::utils::io::xlsx::read_first_sheet_batch;

/// One annotated radiology report
#[derive(Debug, Clone)]
pub struct RadReportRow {
    pub accession: String,
    pub order_reason: Option<String>,
    pub report: Option<String>,
    pub keyword_flags: KeywordFlags,
    /// `accession` with modality markers stripped
    pub accession_stripped: String,
}

/// Load and deserialize the report export (first sheet of the workbook)
pub fn load(path: &Path) -> Result<Vec<RadReportRow>> {
    let batch = read_first_sheet_batch(path)?;
    warn_missing_columns("rad_reports", &rad_reports_schema(), &batch);
    deserialize_batch(&batch)
}

/// Deserialize one record batch of report rows
pub fn deserialize_batch(batch: &RecordBatch) -> Result<Vec<RadReportRow>> {
    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let Some(accession) = extract_string(batch, row, "accession", true)? else {
            continue;
        };

        let flag = |name: &str| -> Result<bool> {
            Ok(extract_bool_flag(batch, row, name, false)?.unwrap_or(false))
        };
        let keyword_flags = KeywordFlags {
            trauma: flag("trauma")?,
            fall: flag("fall")?,
            injury: flag("injury")?,
            assault: flag("assault")?,
            auto: flag("auto")?,
            any_trauma: flag("any trauma")?,
            hemorrhage: flag("hemorrhage")?,
            posttraumatic_hemorrhage: flag("posttraumatic hemorrhage")?,
        };

        rows.push(RadReportRow {
            accession_stripped: strip_modality_markers(&accession),
            accession,
            order_reason: extract_string(batch, row, "order_reason", false)?,
            report: extract_string(batch, row, "report", false)?,
            keyword_flags,
        });
    }
    Ok(rows)
}
