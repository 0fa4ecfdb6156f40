//! Image index loader
//!
//! The image index is the archive's bulk export of brain CT studies: one
//! row per accession with the three accession aliases, study date/time,
//! and series identifiers.

use std::path::Path;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{info, warn};
use rustc_hash::FxHashSet;

use crate::accession::strip_modality_markers;
use crate::error::Result;
use crate::registry::schemas::image_index_schema;
use crate::registry::TableSource;
use crate::utils::arrow::extract_string;

/// One row of the image index export
#[derive(Debug, Clone)]
pub struct ImageIndexRow {
    pub search_accession: String,
    pub vna_accession: Option<String>,
    pub edw_accession: String,
    pub study_id: Option<String>,
    pub study_description: Option<String>,
    pub suids: Option<String>,
    pub study_datetime: Option<NaiveDateTime>,
    /// `SearchAccession` with modality markers stripped
    pub accession_stripped: String,
}

/// Loader for the image index export
pub struct ImageIndexSource;

impl TableSource for ImageIndexSource {
    fn source_name(&self) -> &'static str {
        "image_index"
    }

    fn schema(&self) -> SchemaRef {
        image_index_schema()
    }
}

/// Load and deserialize the image index export
pub fn load(path: &Path) -> Result<Vec<ImageIndexRow>> {
    let batches = ImageIndexSource.load(path)?;
    let mut rows = Vec::new();
    for batch in &batches {
        rows.extend(deserialize_batch(batch)?);
    }

    // Each row of a clean export is one unique accession; duplicates mean
    // the archive extraction overlapped and joins will multiply rows.
    let unique: FxHashSet<&str> = rows.iter().map(|r| r.search_accession.as_str()).collect();
    if unique.len() == rows.len() {
        info!("Image index: {} rows, all accessions unique", rows.len());
    } else {
        warn!(
            "Image index: {} rows but only {} unique accessions",
            rows.len(),
            unique.len()
        );
    }

    Ok(rows)
}

/// Deserialize one record batch of image index rows
pub fn deserialize_batch(batch: &RecordBatch) -> Result<Vec<ImageIndexRow>> {
    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let Some(search_accession) = extract_string(batch, row, "SearchAccession", true)? else {
            continue;
        };
        let Some(edw_accession) = extract_string(batch, row, "EDWAccession", true)? else {
            continue;
        };
        let study_date = extract_string(batch, row, "StudyDate", false)?;
        let study_time = extract_string(batch, row, "StudyTime", false)?;

        rows.push(ImageIndexRow {
            accession_stripped: strip_modality_markers(&search_accession),
            search_accession,
            vna_accession: extract_string(batch, row, "VNAAccession", false)?,
            edw_accession,
            study_id: extract_string(batch, row, "StudyID", false)?,
            study_description: extract_string(batch, row, "StudyDescription", false)?,
            suids: extract_string(batch, row, "SUIDs", false)?,
            study_datetime: parse_study_datetime(study_date.as_deref(), study_time.as_deref()),
        });
    }
    Ok(rows)
}

/// Parse the archive's `StudyDate` (`YYYYMMDD`) and `StudyTime`
/// (`HHMMSS[.ffffff]`) into a timestamp. A missing or malformed time
/// defaults to midnight; a malformed date yields `None`.
fn parse_study_datetime(date: Option<&str>, time: Option<&str>) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date?.trim(), "%Y%m%d").ok()?;
    let time = time.and_then(parse_study_time).unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time))
}

fn parse_study_time(raw: &str) -> Option<NaiveTime> {
    let integral = raw.trim().split('.').next()?;
    let padded = format!("{integral:0>6}");
    NaiveTime::parse_from_str(&padded, "%H%M%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_date_and_fractional_time() {
        let dt = parse_study_datetime(Some("20210310"), Some("143025.000000")).unwrap();
        assert_eq!(dt.to_string(), "2021-03-10 14:30:25");
    }

    #[test]
    fn missing_time_defaults_to_midnight() {
        let dt = parse_study_datetime(Some("20210310"), None).unwrap();
        assert_eq!(dt.to_string(), "2021-03-10 00:00:00");
    }

    #[test]
    fn malformed_date_is_none() {
        assert!(parse_study_datetime(Some("March 10"), Some("120000")).is_none());
        assert!(parse_study_datetime(None, Some("120000")).is_none());
    }
}
