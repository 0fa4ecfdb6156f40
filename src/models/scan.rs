//! Scan-localization records: manifest rows, the curated inclusion list,
//! and resolved scan folders

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;

use crate::error::Result;

/// One line of a pipe-delimited transfer manifest
#[derive(Debug, Clone)]
pub struct ManifestRow {
    /// Site-local patient identifier from the transfer tool
    pub patient_id: String,
    /// Accession as written by the transfer tool
    pub accession: String,
    /// Folder name under the batch's image root
    pub folder: String,
    /// Absolute path of the scan folder (image root + folder, spaces removed)
    pub file_path: String,
    /// Manifest batch the row came from
    pub batch: String,
    /// Normalized accession used as the join key
    pub accession_normalized: String,
}

/// One row of the curated scans-to-include list
#[derive(Debug, Clone)]
pub struct InclusionRow {
    pub unique_study_id: String,
    pub report_num: String,
    pub search_accession: String,
    pub vna_accession: Option<String>,
    pub edw_accession: String,
    pub study_id: Option<String>,
    /// Acquisition timestamp of the study
    pub study_datetime: Option<NaiveDateTime>,
    /// Whether the report annotation flagged post-traumatic hemorrhage
    pub flag_post_trauma_hem: Option<bool>,
    /// Normalized report-number accession used as the primary join key
    pub accession_normalized: String,
}

/// One localized scan: an inclusion-list entry resolved to a folder on disk
#[derive(Debug, Clone)]
pub struct ScanFolder {
    pub unique_study_id: String,
    pub report_num: String,
    pub patient_id: String,
    pub folder: String,
    pub file_path: String,
    /// Manifest batch the folder was found in
    pub batch: String,
    /// Which join resolved the folder: the report-number accession or the
    /// archive accession fallback
    pub matched_on: MatchKey,
    pub study_datetime: Option<NaiveDateTime>,
    pub flag_post_trauma_hem: Option<bool>,
}

impl ScanFolder {
    /// Convert records to a record batch for the localization artifact
    pub fn to_batch(records: &[Self]) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("unique_study_id", DataType::Utf8, false),
            Field::new("report_num_temp", DataType::Utf8, false),
            Field::new("patient_id", DataType::Utf8, false),
            Field::new("folder", DataType::Utf8, false),
            Field::new("file_path", DataType::Utf8, false),
            Field::new("batch", DataType::Utf8, false),
            Field::new("matched_on", DataType::Utf8, false),
            Field::new("StudyDate_Time_format", DataType::Utf8, true),
            Field::new("flag_post_trauma_hem", DataType::Boolean, true),
        ]));

        let strings = |f: fn(&Self) -> &str| -> ArrayRef {
            Arc::new(records.iter().map(|r| Some(f(r))).collect::<StringArray>())
        };

        let columns: Vec<ArrayRef> = vec![
            strings(|r| &r.unique_study_id),
            strings(|r| &r.report_num),
            strings(|r| &r.patient_id),
            strings(|r| &r.folder),
            strings(|r| &r.file_path),
            strings(|r| &r.batch),
            strings(|r| r.matched_on.as_str()),
            Arc::new(
                records
                    .iter()
                    .map(|r| {
                        r.study_datetime
                            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    })
                    .collect::<StringArray>(),
            ),
            Arc::new(
                records
                    .iter()
                    .map(|r| r.flag_post_trauma_hem)
                    .collect::<BooleanArray>(),
            ),
        ];

        Ok(RecordBatch::try_new(schema, columns)?)
    }
}

/// Join key that resolved a scan folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKey {
    /// Primary: normalized report-number accession
    Accession,
    /// Fallback: normalized vendor-neutral-archive accession
    VnaAccession,
}

impl MatchKey {
    /// Stable label used in the localized-scan artifact
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accession => "accession",
            Self::VnaAccession => "vna_accession",
        }
    }
}
