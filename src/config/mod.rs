//! Configuration for the cohort pipeline.
//!
//! Every external input and every artifact the pipeline writes has a
//! configured path, so a run against a new data snapshot only needs a new
//! config file rather than edited source.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One transfer-manifest batch: the pipe-delimited identifier list and the
/// directory its `folder` entries live under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestBatch {
    /// Label used in logs and the `batch` column of the localized scan list
    pub name: String,
    /// Path to the pipe-delimited `patient_id|accession|folder` file
    pub manifest_path: PathBuf,
    /// Directory prefixed onto `folder` to form the on-disk `file_path`
    pub image_root: PathBuf,
}

/// Configuration for the cohort pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory where stage artifacts are written
    pub processed_dir: PathBuf,
    /// Image index export from the imaging archive (CSV)
    pub image_index_path: PathBuf,
    /// Annotated radiology report export (XLSX)
    pub rad_reports_path: PathBuf,
    /// Master list mapping accession aliases to `unique_study_id` (CSV)
    pub identifiers_path: PathBuf,
    /// Curated list of studies/scans selected for the cohort (CSV)
    pub scan_inclusion_path: PathBuf,
    /// Transfer-manifest batches, in the order they were received
    pub manifest_batches: Vec<ManifestBatch>,
    /// Directory containing per-batch segmentation outputs
    /// (`batch_*/predictions/prediction.csv`)
    pub predictions_dir: PathBuf,
    /// Manual review workbook (XLSX)
    pub review_workbook_path: PathBuf,
    /// Sheet with patient-level include/exclude annotations
    pub inclusion_sheet: String,
    /// Sheet listing scan ids to drop outright
    pub scans_to_exclude_sheet: String,
    /// Sheet resolving sessions with multiple candidate images
    pub multiple_image_sheet: String,
    /// Chart-review workbook for patients above the baseline threshold (XLSX)
    pub chart_review_workbook_path: PathBuf,
    /// Sheet with the chart-review annotations
    pub chart_review_sheet: String,
    /// Scan ids removed after manual inspection of the source data
    pub problem_scan_ids: Vec<String>,
    /// Minimum slice count for a usable series (inclusive)
    pub min_slices: u32,
    /// Slice count at or above which a series is discarded
    pub max_slices: u32,
    /// Follow-up window relative to each patient's first scan, in hours
    pub follow_up_window_hours: i64,
    /// Minimum first-scan hemorrhage volume (IPH or EAH) for inclusion, in mL
    pub baseline_volume_ml: f64,
    /// Volume-increase thresholds for the outcome flags, in mL
    pub outcome_thresholds_ml: Vec<f64>,
    /// Seed for the train/test shuffle
    pub split_seed: u64,
    /// Fraction of patients held out for testing
    pub test_fraction: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            processed_dir: PathBuf::from("data/processed"),
            image_index_path: PathBuf::from("data/image_index.csv"),
            rad_reports_path: PathBuf::from("data/post_traumatic_hemorrhage_search.xlsx"),
            identifiers_path: PathBuf::from("data/study_identifiers_master_list.csv"),
            scan_inclusion_path: PathBuf::from("data/processed/tbi_patients_scans_to_include.csv"),
            manifest_batches: vec![
                ManifestBatch {
                    name: "batch1".to_string(),
                    manifest_path: PathBuf::from("data/transfers/batch1/LocalIdentifierList.txt"),
                    image_root: PathBuf::from("data/transfers/batch1/images"),
                },
                ManifestBatch {
                    name: "batch2".to_string(),
                    manifest_path: PathBuf::from("data/transfers/batch2/LocalIdentifierList.txt"),
                    image_root: PathBuf::from("data/transfers/batch2/images"),
                },
            ],
            predictions_dir: PathBuf::from("data/processed/blast_ct_predictions"),
            review_workbook_path: PathBuf::from(
                "data/processed/manual_review/initial_tbi_patient_list_inclusion.xlsx",
            ),
            inclusion_sheet: "initial_tbi_patient_list_inc".to_string(),
            scans_to_exclude_sheet: "scans_to_exclude".to_string(),
            multiple_image_sheet: "multiple_image_filter".to_string(),
            chart_review_workbook_path: PathBuf::from(
                "data/processed/manual_review/initial_tbi_patient_list_inclusion_2ml.xlsx",
            ),
            chart_review_sheet: "chart_review".to_string(),
            problem_scan_ids: vec!["scan_5338".to_string()],
            min_slices: 30,
            max_slices: 100,
            follow_up_window_hours: 72,
            baseline_volume_ml: 2.0,
            outcome_thresholds_ml: vec![6.0, 8.0, 10.0],
            split_seed: 1300,
            test_fraction: 0.3,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Path of a stage artifact under the processed-data directory
    #[must_use]
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.processed_dir.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.manifest_batches.len(), 2);
        assert_eq!(parsed.split_seed, config.split_seed);
        assert_eq!(parsed.problem_scan_ids, vec!["scan_5338".to_string()]);
    }
}
