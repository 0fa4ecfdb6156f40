//! Manual review workbook loaders
//!
//! Inclusion/exclusion decisions were made by chart review and recorded in
//! Excel workbooks. Three sheets drive the pipeline: the patient-level
//! inclusion sheet, the list of scan ids to drop outright, and the
//! per-session image overrides. A second workbook holds the chart-review
//! annotations for patients above the baseline volume threshold.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use log::info;

use crate::error::Result;
use crate::models::ReviewAnnotations;
use crate::utils::arrow::{extract_bool_flag, extract_float64, extract_key, extract_string};
use crate::utils::io::read_sheet_batch;

/// Patient-level decision from the inclusion sheet
#[derive(Debug, Clone)]
pub struct PatientReview {
    pub unique_study_id: String,
    /// 1 = excluded, 0 = included, blank = not yet reviewed
    pub exclude: Option<bool>,
    /// Reviewer's expansion-candidate marker (1, or 999 for borderline)
    pub potential_hematoma_expansion_case: Option<f64>,
    pub notes: Option<String>,
}

/// One scan id dropped outright after image review
#[derive(Debug, Clone)]
pub struct ScanExclusion {
    pub unique_study_id: Option<String>,
    /// The `id_to_remove` column
    pub scan_id: String,
}

/// Manually chosen image for a session with several candidates
#[derive(Debug, Clone)]
pub struct ImageOverride {
    pub unique_study_id: String,
    /// The `id_to_keep` column
    pub scan_id: String,
}

/// One patient's chart-review annotations
#[derive(Debug, Clone)]
pub struct ChartReview {
    pub unique_study_id: String,
    /// 1 = excluded, 0 = included
    pub exclude: Option<bool>,
    pub annotations: ReviewAnnotations,
}

/// Load the patient-level inclusion sheet
pub fn load_patient_reviews(path: &Path, sheet: &str) -> Result<Vec<PatientReview>> {
    let batch = read_sheet_batch(path, sheet)?;
    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let Some(unique_study_id) = extract_key(&batch, row, "unique_study_id", true)? else {
            continue;
        };
        rows.push(PatientReview {
            unique_study_id,
            exclude: extract_bool_flag(&batch, row, "exclude", false)?,
            potential_hematoma_expansion_case: extract_float64(
                &batch,
                row,
                "potential_hematoma_expansion_case",
                false,
            )?,
            notes: extract_string(&batch, row, "notes", false)?,
        });
    }
    info!("Patient review sheet '{}': {} rows", sheet, rows.len());
    Ok(rows)
}

/// Load the scans-to-exclude sheet
pub fn load_scan_exclusions(path: &Path, sheet: &str) -> Result<Vec<ScanExclusion>> {
    let batch = read_sheet_batch(path, sheet)?;
    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let Some(scan_id) = extract_key(&batch, row, "id_to_remove", true)? else {
            continue;
        };
        rows.push(ScanExclusion {
            unique_study_id: extract_key(&batch, row, "unique_study_id", false)?,
            scan_id,
        });
    }
    info!("Scan exclusion sheet '{}': {} rows", sheet, rows.len());
    Ok(rows)
}

/// Load the per-session image override sheet
pub fn load_image_overrides(path: &Path, sheet: &str) -> Result<Vec<ImageOverride>> {
    let batch = read_sheet_batch(path, sheet)?;
    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let Some(unique_study_id) = extract_key(&batch, row, "unique_study_id", true)? else {
            continue;
        };
        let Some(scan_id) = extract_key(&batch, row, "id_to_keep", true)? else {
            continue;
        };
        rows.push(ImageOverride {
            unique_study_id,
            scan_id,
        });
    }
    info!("Image override sheet '{}': {} rows", sheet, rows.len());
    Ok(rows)
}

/// Load the chart-review sheet
pub fn load_chart_reviews(path: &Path, sheet: &str) -> Result<Vec<ChartReview>> {
    let batch = read_sheet_batch(path, sheet)?;
    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        rows.extend(deserialize_chart_review_row(&batch, row)?);
    }
    info!("Chart review sheet '{}': {} rows", sheet, rows.len());
    Ok(rows)
}

fn deserialize_chart_review_row(batch: &RecordBatch, row: usize) -> Result<Option<ChartReview>> {
    let Some(unique_study_id) = extract_key(batch, row, "unique_study_id", true)? else {
        return Ok(None);
    };
    let annotations = ReviewAnnotations {
        injury: extract_string(batch, row, "injury", false)?,
        surgery: extract_bool_flag(batch, row, "surgery", false)?,
        surgery_type: extract_string(batch, row, "surgery_type", false)?,
        first_scan_after_surgery: extract_bool_flag(batch, row, "first_scan_after_surgery", false)?,
        second_scan_post_surgery: extract_bool_flag(
            batch,
            row,
            "second_scan_post_surgery_trauma",
            false,
        )?
        .unwrap_or(false),
        artifact: extract_bool_flag(batch, row, "artifact", false)?,
        prior_neurological_surgery: extract_bool_flag(
            batch,
            row,
            "prior_neurological_surgery",
            false,
        )?,
        reason_excluded: extract_string(batch, row, "reason_excluded", false)?,
        notes: extract_string(batch, row, "notes", false)?,
    };
    Ok(Some(ChartReview {
        unique_study_id,
        exclude: extract_bool_flag(batch, row, "exclude", false)?,
        annotations,
    }))
}
