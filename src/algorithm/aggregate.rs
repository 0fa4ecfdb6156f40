//! Segmentation-output aggregation
//!
//! Joins the concatenated per-batch segmentation outputs back to the
//! localized scans: attaches `unique_study_id` and the report number via
//! the scan folder, numbers each patient's imaging sessions
//! chronologically, and carries the per-series slice count from the
//! header stage.

use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::models::{CompartmentVolumes, PredictionRecord, ScanFolder};

/// One segmentation run joined to its study and imaging session
#[derive(Debug, Clone)]
pub struct PreparedPrediction {
    /// Segmentation run id (e.g. `scan_42`)
    pub scan_id: String,
    pub image: String,
    pub prediction: String,
    pub volumes: CompartmentVolumes,
    /// Quality metric with the missing-value convention applied
    pub quality_metric: f64,
    pub unique_study_id: String,
    pub report_num: String,
    pub folder: String,
    /// Series directory name, distinguishing repeat acquisitions within
    /// one scan folder
    pub image_name: String,
    pub study_datetime: NaiveDateTime,
    pub flag_post_trauma_hem: Option<bool>,
    /// 1-based chronological session number within the patient
    pub scan_number: u32,
    pub slice_count: u32,
}

impl PreparedPrediction {
    /// Convert records to a record batch for the stage artifact
    pub fn to_batch(records: &[Self]) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("unique_study_id", DataType::Utf8, false),
            Field::new("report_num_temp", DataType::Utf8, false),
            Field::new("id", DataType::Utf8, false),
            Field::new("scan_number", DataType::UInt32, false),
            Field::new("StudyDate_Time_format", DataType::Utf8, false),
            Field::new("folder", DataType::Utf8, false),
            Field::new("image_name", DataType::Utf8, false),
            Field::new("image", DataType::Utf8, false),
            Field::new("prediction", DataType::Utf8, false),
            Field::new("slice_num", DataType::UInt32, false),
            Field::new("iph_predicted_volume_ml", DataType::Float64, false),
            Field::new("eah_predicted_volume_ml", DataType::Float64, false),
            Field::new("oedema_predicted_volume_ml", DataType::Float64, false),
            Field::new("ivh_predicted_volume_ml", DataType::Float64, false),
            Field::new("quality_control_metric", DataType::Float64, false),
        ]));

        let strings = |f: fn(&Self) -> &str| -> ArrayRef {
            Arc::new(records.iter().map(|r| Some(f(r))).collect::<StringArray>())
        };
        let floats = |f: fn(&Self) -> f64| -> ArrayRef {
            Arc::new(records.iter().map(|r| Some(f(r))).collect::<Float64Array>())
        };

        let columns: Vec<ArrayRef> = vec![
            strings(|r| &r.unique_study_id),
            strings(|r| &r.report_num),
            strings(|r| &r.scan_id),
            Arc::new(
                records
                    .iter()
                    .map(|r| Some(r.scan_number))
                    .collect::<UInt32Array>(),
            ),
            Arc::new(
                records
                    .iter()
                    .map(|r| Some(r.study_datetime.format("%Y-%m-%d %H:%M:%S").to_string()))
                    .collect::<StringArray>(),
            ),
            strings(|r| &r.folder),
            strings(|r| &r.image_name),
            strings(|r| &r.image),
            strings(|r| &r.prediction),
            Arc::new(
                records
                    .iter()
                    .map(|r| Some(r.slice_count))
                    .collect::<UInt32Array>(),
            ),
            floats(|r| r.volumes.iph),
            floats(|r| r.volumes.eah),
            floats(|r| r.volumes.oedema),
            floats(|r| r.volumes.ivh),
            floats(|r| r.quality_metric),
        ];

        Ok(RecordBatch::try_new(schema, columns)?)
    }
}

/// Row counts of the aggregation joins
#[derive(Debug, Clone, Default)]
pub struct AggregateSummary {
    pub prediction_rows: usize,
    /// Rows joined to a localized scan
    pub matched_rows: usize,
    /// Rows whose image path matched no localized folder
    pub missing_folder: usize,
    /// Rows whose study carries no usable timestamp
    pub missing_timestamp: usize,
    /// Rows with no slice count from the header stage
    pub missing_slice_count: usize,
}

/// Extract the scan folder name from a segmentation image path
/// (`nifti_images/<folder>/...`)
#[must_use]
pub fn folder_from_image_path(image: &str) -> Option<String> {
    image.trim().split('/').nth(1).map(str::to_string)
}

/// Extract the series directory name from an image or series path
/// (the segment following `/random/`)
#[must_use]
pub fn image_name_from_path(path: &str) -> Option<String> {
    let after = path.split("/random/").nth(1)?;
    after.split('/').next().map(str::to_string)
}

/// Extract the scan folder name from a series directory path
/// (the segment following `/images/`)
#[must_use]
pub fn folder_from_series_path(path: &str) -> Option<String> {
    let after = path.split("/images/").nth(1)?;
    after.split('/').next().map(str::to_string)
}

/// Build a (folder, image name) -> slice count index from the wide
/// header table
pub fn slice_count_index(headers: &RecordBatch) -> Result<FxHashMap<(String, String), u32>> {
    let path_idx = headers.schema().index_of("file_path").map_err(|_| {
        crate::error::Error::ColumnNotFound {
            column: "file_path".to_string(),
        }
    })?;
    let count_idx = headers.schema().index_of("slice_count").map_err(|_| {
        crate::error::Error::ColumnNotFound {
            column: "slice_count".to_string(),
        }
    })?;

    let paths = crate::utils::arrow::downcast_array::<StringArray>(
        &headers.column(path_idx).clone(),
        "file_path",
        "String",
    )?
    .clone();
    let counts = crate::utils::arrow::downcast_array::<UInt32Array>(
        &headers.column(count_idx).clone(),
        "slice_count",
        "UInt32",
    )?
    .clone();

    let mut index = FxHashMap::default();
    for row in 0..paths.len() {
        if paths.is_null(row) || counts.is_null(row) {
            continue;
        }
        let path = paths.value(row);
        let (Some(folder), Some(image_name)) =
            (folder_from_series_path(path), image_name_from_path(path))
        else {
            continue;
        };
        // Keep the largest series when a directory layout repeats a name.
        let entry = index.entry((folder, image_name)).or_insert(0);
        *entry = (*entry).max(counts.value(row));
    }
    Ok(index)
}

/// Join predictions to localized scans and number each patient's sessions
pub fn prepare_predictions(
    predictions: &[PredictionRecord],
    scan_folders: &[ScanFolder],
    slice_counts: &FxHashMap<(String, String), u32>,
) -> Result<(Vec<PreparedPrediction>, AggregateSummary)> {
    let mut summary = AggregateSummary {
        prediction_rows: predictions.len(),
        ..AggregateSummary::default()
    };

    let mut by_folder: FxHashMap<&str, &ScanFolder> = FxHashMap::default();
    for scan in scan_folders {
        by_folder.entry(scan.folder.as_str()).or_insert(scan);
    }

    let mut joined: Vec<PreparedPrediction> = Vec::new();
    for prediction in predictions {
        let image = prediction.image.trim().to_string();
        let Some(folder) = folder_from_image_path(&image) else {
            summary.missing_folder += 1;
            continue;
        };
        let Some(scan) = by_folder.get(folder.as_str()) else {
            summary.missing_folder += 1;
            continue;
        };
        let Some(study_datetime) = scan.study_datetime else {
            summary.missing_timestamp += 1;
            continue;
        };

        let image_name = image_name_from_path(&image).unwrap_or_else(|| folder.clone());
        let slice_count = match slice_counts.get(&(folder.clone(), image_name.clone())) {
            Some(count) => *count,
            None => {
                summary.missing_slice_count += 1;
                0
            }
        };

        joined.push(PreparedPrediction {
            scan_id: prediction.id.clone(),
            prediction: prediction.prediction.trim().to_string(),
            volumes: prediction.volumes(),
            quality_metric: prediction.quality_metric(),
            unique_study_id: scan.unique_study_id.clone(),
            report_num: scan.report_num.clone(),
            folder,
            image_name,
            study_datetime,
            flag_post_trauma_hem: scan.flag_post_trauma_hem,
            scan_number: 0,
            slice_count,
            image,
        });
    }
    summary.matched_rows = joined.len();

    assign_scan_numbers(&mut joined);

    info!(
        "Prepared predictions: {} rows in, {} joined, {} without folder, {} without timestamp, {} without slice count",
        summary.prediction_rows,
        summary.matched_rows,
        summary.missing_folder,
        summary.missing_timestamp,
        summary.missing_slice_count
    );
    if summary.missing_folder > 0 {
        warn!(
            "{} prediction rows matched no localized scan folder",
            summary.missing_folder
        );
    }

    Ok((joined, summary))
}

/// Number each patient's imaging sessions chronologically.
///
/// A session is one (timestamp, folder) pair; all images of the session
/// share a number. Numbering is dense and starts at 1.
pub fn assign_scan_numbers(records: &mut [PreparedPrediction]) {
    let assigned: Vec<u32> = {
        let mut sessions: FxHashMap<&str, BTreeSet<(NaiveDateTime, &str)>> = FxHashMap::default();
        for record in records.iter() {
            sessions
                .entry(record.unique_study_id.as_str())
                .or_default()
                .insert((record.study_datetime, record.folder.as_str()));
        }

        let mut numbers: FxHashMap<(&str, NaiveDateTime, &str), u32> = FxHashMap::default();
        for (study, study_sessions) in &sessions {
            for (number, (datetime, folder)) in study_sessions.iter().enumerate() {
                numbers.insert((study, *datetime, folder), number as u32 + 1);
            }
        }

        records
            .iter()
            .map(|record| {
                numbers
                    .get(&(
                        record.unique_study_id.as_str(),
                        record.study_datetime,
                        record.folder.as_str(),
                    ))
                    .copied()
                    .unwrap_or(0)
            })
            .collect()
    };

    for (record, number) in records.iter_mut().zip(assigned) {
        record.scan_number = number;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn record(usid: &str, folder: &str, datetime: NaiveDateTime) -> PreparedPrediction {
        PreparedPrediction {
            scan_id: "scan_1".to_string(),
            image: format!("nifti_images/{folder}/random/head/img.nii"),
            prediction: String::new(),
            volumes: CompartmentVolumes::default(),
            quality_metric: 1.0,
            unique_study_id: usid.to_string(),
            report_num: "CT1".to_string(),
            folder: folder.to_string(),
            image_name: "head".to_string(),
            study_datetime: datetime,
            flag_post_trauma_hem: None,
            scan_number: 0,
            slice_count: 40,
        }
    }

    #[test]
    fn path_helpers_extract_segments() {
        assert_eq!(
            folder_from_image_path("nifti_images/F100/random/head_h41/img.nii").as_deref(),
            Some("F100")
        );
        assert_eq!(
            image_name_from_path("/share/images/F100/random/head_h41/CT.1.dcm").as_deref(),
            Some("head_h41")
        );
        assert_eq!(
            folder_from_series_path("/share/images/F100/random/head_h41").as_deref(),
            Some("F100")
        );
        assert_eq!(image_name_from_path("no/random/").as_deref(), Some(""));
        assert!(folder_from_series_path("no-images-segment").is_none());
    }

    #[test]
    fn sessions_numbered_chronologically_per_patient() {
        let mut records = vec![
            record("1", "F2", dt(12, 8)),
            record("1", "F1", dt(10, 9)),
            record("1", "F1", dt(10, 9)),
            record("2", "F9", dt(11, 7)),
        ];
        assign_scan_numbers(&mut records);
        assert_eq!(records[0].scan_number, 2);
        assert_eq!(records[1].scan_number, 1);
        assert_eq!(records[2].scan_number, 1);
        assert_eq!(records[3].scan_number, 1);
    }
}
