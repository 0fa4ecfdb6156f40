//! Curated inclusion list loader
//!
//! The inclusion list is the manually curated set of studies selected for
//! the cohort after report review. Scan localization resolves every row of
//! it to a folder on disk.

use std::path::Path;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use log::warn;

use crate::accession::normalize;
use crate::error::Result;
use crate::models::InclusionRow;
use crate::registry::schemas::inclusion_list_schema;
use crate::registry::TableSource;
use crate::utils::arrow::{extract_bool_flag, extract_key, extract_string};

/// Loader for the curated scans-to-include list
pub struct InclusionListSource;

impl TableSource for InclusionListSource {
    fn source_name(&self) -> &'static str {
        "inclusion_list"
    }

    fn schema(&self) -> SchemaRef {
        inclusion_list_schema()
    }
}

/// Load and deserialize the inclusion list
pub fn load(path: &Path) -> Result<Vec<InclusionRow>> {
    let batches = InclusionListSource.load(path)?;
    let mut rows = Vec::new();
    for batch in &batches {
        rows.extend(deserialize_batch(batch)?);
    }
    Ok(rows)
}

/// Deserialize one record batch of inclusion rows
pub fn deserialize_batch(batch: &RecordBatch) -> Result<Vec<InclusionRow>> {
    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let Some(unique_study_id) = extract_key(batch, row, "unique_study_id", true)? else {
            continue;
        };
        let Some(report_num) = extract_string(batch, row, "report_num_temp", true)? else {
            continue;
        };
        let search_accession =
            extract_string(batch, row, "SearchAccession", false)?.unwrap_or_default();
        let edw_accession = extract_string(batch, row, "EDWAccession", false)?.unwrap_or_default();
        let study_datetime = extract_string(batch, row, "StudyDate_Time_format", false)?
            .as_deref()
            .and_then(parse_datetime);

        rows.push(InclusionRow {
            accession_normalized: normalize(&report_num),
            unique_study_id,
            report_num,
            search_accession,
            vna_accession: extract_string(batch, row, "VNAAccession", false)?,
            edw_accession,
            study_id: extract_string(batch, row, "StudyID", false)?,
            study_datetime,
            flag_post_trauma_hem: extract_bool_flag(batch, row, "flag_post_trauma_hem", false)?,
        });
    }
    Ok(rows)
}

/// Parse the `StudyDate_Time_format` column written by the
/// reconciliation stage (`YYYY-MM-DD HH:MM:SS`, optionally fractional)
fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|err| {
            warn!("Unparseable study timestamp '{trimmed}': {err}");
            err
        })
        .ok()
}
