//! Modeling-ready cohort records

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::Result;
use crate::models::prediction::{CompartmentVolumes, ScanVolumeRecord};

/// Patient-level chart-review annotations attached to a cohort record
#[derive(Debug, Clone, Default)]
pub struct ReviewAnnotations {
    pub injury: Option<String>,
    pub surgery: Option<bool>,
    pub surgery_type: Option<String>,
    pub first_scan_after_surgery: Option<bool>,
    /// Censoring flag: the second scan was acquired after surgery or a
    /// repeat trauma, so volume changes no longer reflect natural
    /// expansion
    pub second_scan_post_surgery: bool,
    pub artifact: Option<bool>,
    pub prior_neurological_surgery: Option<bool>,
    pub reason_excluded: Option<String>,
    pub notes: Option<String>,
}

/// One scan of the finalized cohort
#[derive(Debug, Clone)]
pub struct CohortRecord {
    pub scan: ScanVolumeRecord,
    /// Hours between this scan and the patient's first scan, rounded to
    /// whole hours
    pub time_since_first_scan_hours: f64,
    pub review: ReviewAnnotations,
    /// Per-patient maximum change from the first scan
    pub max_change_from_first: CompartmentVolumes,
    /// Hemorrhage-expansion outcomes at the configured thresholds,
    /// in threshold order. `None` for censored post-surgical patients.
    pub outcomes: Vec<Option<bool>>,
}

impl CohortRecord {
    /// Convert records to a record batch for the modeling artifacts.
    ///
    /// `thresholds` name the outcome columns (`outcome_6ml`, ...); every
    /// record must carry one outcome per threshold.
    pub fn to_batch(records: &[Self], thresholds: &[f64]) -> Result<RecordBatch> {
        let mut fields = vec![
            Field::new("unique_study_id", DataType::Utf8, false),
            Field::new("report_num", DataType::Utf8, false),
            Field::new("scan_id", DataType::Utf8, false),
            Field::new("scan_number", DataType::UInt32, false),
            Field::new("study_datetime", DataType::Utf8, false),
            Field::new("time_since_first_scan_hours", DataType::Float64, false),
            Field::new("quality_control_metric", DataType::Float64, false),
            Field::new("injury", DataType::Utf8, true),
            Field::new("surgery", DataType::Boolean, true),
            Field::new("surgery_type", DataType::Utf8, true),
            Field::new("first_scan_after_surgery", DataType::Boolean, true),
            Field::new("second_scan_post_surgery_trauma", DataType::Boolean, false),
            Field::new("artifact", DataType::Boolean, true),
            Field::new("prior_neurological_surgery", DataType::Boolean, true),
            Field::new("reason_excluded", DataType::Utf8, true),
            Field::new("notes", DataType::Utf8, true),
            Field::new("iph_predicted_volume_ml", DataType::Float64, false),
            Field::new("eah_predicted_volume_ml", DataType::Float64, false),
            Field::new("oedema_predicted_volume_ml", DataType::Float64, false),
            Field::new("ivh_predicted_volume_ml", DataType::Float64, false),
            Field::new("change_iph_volume_first_scan", DataType::Float64, false),
            Field::new("change_eah_volume_first_scan", DataType::Float64, false),
            Field::new("change_ivh_volume_first_scan", DataType::Float64, false),
            Field::new("max_change_iph_volume_first_scan", DataType::Float64, false),
            Field::new("max_change_eah_volume_first_scan", DataType::Float64, false),
            Field::new("max_change_ivh_volume_first_scan", DataType::Float64, false),
        ];
        for threshold in thresholds {
            fields.push(Field::new(
                format!("outcome_{threshold}ml"),
                DataType::Boolean,
                true,
            ));
        }
        let schema = Arc::new(Schema::new(fields));

        let strings = |f: fn(&Self) -> &str| -> ArrayRef {
            Arc::new(records.iter().map(|r| Some(f(r))).collect::<StringArray>())
        };
        let opt_strings = |f: fn(&Self) -> Option<&str>| -> ArrayRef {
            Arc::new(records.iter().map(f).collect::<StringArray>())
        };
        let floats = |f: fn(&Self) -> f64| -> ArrayRef {
            Arc::new(records.iter().map(|r| Some(f(r))).collect::<Float64Array>())
        };
        let opt_bools = |f: fn(&Self) -> Option<bool>| -> ArrayRef {
            Arc::new(records.iter().map(f).collect::<BooleanArray>())
        };

        let mut columns: Vec<ArrayRef> = vec![
            strings(|r| &r.scan.unique_study_id),
            strings(|r| &r.scan.report_num),
            strings(|r| &r.scan.scan_id),
            Arc::new(
                records
                    .iter()
                    .map(|r| Some(r.scan.scan_number))
                    .collect::<UInt32Array>(),
            ),
            Arc::new(
                records
                    .iter()
                    .map(|r| {
                        Some(r.scan.study_datetime.format("%Y-%m-%d %H:%M:%S").to_string())
                    })
                    .collect::<StringArray>(),
            ),
            floats(|r| r.time_since_first_scan_hours),
            floats(|r| r.scan.quality_control_metric),
            opt_strings(|r| r.review.injury.as_deref()),
            opt_bools(|r| r.review.surgery),
            opt_strings(|r| r.review.surgery_type.as_deref()),
            opt_bools(|r| r.review.first_scan_after_surgery),
            Arc::new(
                records
                    .iter()
                    .map(|r| Some(r.review.second_scan_post_surgery))
                    .collect::<BooleanArray>(),
            ),
            opt_bools(|r| r.review.artifact),
            opt_bools(|r| r.review.prior_neurological_surgery),
            opt_strings(|r| r.review.reason_excluded.as_deref()),
            opt_strings(|r| r.review.notes.as_deref()),
            floats(|r| r.scan.volumes.iph),
            floats(|r| r.scan.volumes.eah),
            floats(|r| r.scan.volumes.oedema),
            floats(|r| r.scan.volumes.ivh),
            floats(|r| r.scan.change_from_first.iph),
            floats(|r| r.scan.change_from_first.eah),
            floats(|r| r.scan.change_from_first.ivh),
            floats(|r| r.max_change_from_first.iph),
            floats(|r| r.max_change_from_first.eah),
            floats(|r| r.max_change_from_first.ivh),
        ];
        for (idx, _) in thresholds.iter().enumerate() {
            columns.push(Arc::new(
                records
                    .iter()
                    .map(|r| r.outcomes.get(idx).copied().flatten())
                    .collect::<BooleanArray>(),
            ));
        }

        Ok(RecordBatch::try_new(schema, columns)?)
    }
}
