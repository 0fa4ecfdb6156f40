//! Segmentation-output records and their longitudinal derivations

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Predicted volume per anatomical compartment, in mL
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompartmentVolumes {
    /// Intraparenchymal hemorrhage
    pub iph: f64,
    /// Extra-axial hemorrhage
    pub eah: f64,
    /// Edema
    pub oedema: f64,
    /// Intraventricular hemorrhage
    pub ivh: f64,
}

impl CompartmentVolumes {
    /// Total hemorrhage volume: IPH + EAH + IVH (edema is not hemorrhage)
    #[must_use]
    pub fn hemorrhage_total(&self) -> f64 {
        self.iph + self.eah + self.ivh
    }

    /// Per-compartment difference from a baseline scan
    #[must_use]
    pub fn change_from(&self, baseline: &Self) -> Self {
        Self {
            iph: self.iph - baseline.iph,
            eah: self.eah - baseline.eah,
            oedema: self.oedema - baseline.oedema,
            ivh: self.ivh - baseline.ivh,
        }
    }

    /// Per-compartment maximum of two volume sets
    #[must_use]
    pub fn max_with(&self, other: &Self) -> Self {
        Self {
            iph: self.iph.max(other.iph),
            eah: self.eah.max(other.eah),
            oedema: self.oedema.max(other.oedema),
            ivh: self.ivh.max(other.ivh),
        }
    }
}

/// One segmentation run as written by the model's per-batch output file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Run identifier assigned when the batch inputs were prepared
    pub id: String,
    /// Path of the input image the model was run on
    pub image: String,
    /// Path of the predicted segmentation volume
    pub prediction: String,
    pub iph_predicted_volume_ml: f64,
    pub eah_predicted_volume_ml: f64,
    pub oedema_predicted_volume_ml: f64,
    pub ivh_predicted_volume_ml: f64,
    /// Segmentation quality score; lower is better. Missing for a few runs.
    pub quality_control_metric: Option<f64>,
}

impl PredictionRecord {
    /// The four compartment volumes as one value
    #[must_use]
    pub fn volumes(&self) -> CompartmentVolumes {
        CompartmentVolumes {
            iph: self.iph_predicted_volume_ml,
            eah: self.eah_predicted_volume_ml,
            oedema: self.oedema_predicted_volume_ml,
            ivh: self.ivh_predicted_volume_ml,
        }
    }

    /// Quality metric with the missing-value convention applied.
    ///
    /// A missing metric maps to 0.0, which lies outside the tool's valid
    /// range and therefore never wins a minimum-metric tie-break.
    #[must_use]
    pub fn quality_metric(&self) -> f64 {
        self.quality_control_metric.unwrap_or(0.0)
    }
}

/// One deduplicated scan with identifiers, session ordering, and
/// longitudinal volume derivations
#[derive(Debug, Clone)]
pub struct ScanVolumeRecord {
    pub unique_study_id: String,
    pub report_num: String,
    /// Segmentation run id (e.g. `scan_42`)
    pub scan_id: String,
    /// 1-based session number in chronological order within the patient
    pub scan_number: u32,
    pub study_datetime: NaiveDateTime,
    pub flag_post_trauma_hem: Option<bool>,
    pub folder: String,
    /// Series folder name within the scan folder, used to distinguish
    /// repeat acquisitions in the same session
    pub image_name: String,
    pub image: String,
    pub prediction: String,
    pub slice_count: u32,
    pub volumes: CompartmentVolumes,
    pub quality_control_metric: f64,
    /// Total hemorrhage volume of this scan
    pub total_volume_ml: f64,
    /// Volumes of the patient's chronologically first scan
    pub first_scan_volumes: CompartmentVolumes,
    /// Total hemorrhage volume of the first scan
    pub first_scan_total_ml: f64,
    /// Change from the first scan, per compartment
    pub change_from_first: CompartmentVolumes,
    /// Change of the total from the first scan
    pub change_total_ml: f64,
}

impl ScanVolumeRecord {
    /// Convert records to a record batch for the stage artifact
    pub fn to_batch(records: &[Self]) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("unique_study_id", DataType::Utf8, false),
            Field::new("report_num", DataType::Utf8, false),
            Field::new("scan_id", DataType::Utf8, false),
            Field::new("scan_number", DataType::UInt32, false),
            Field::new("study_datetime", DataType::Utf8, false),
            Field::new("folder", DataType::Utf8, false),
            Field::new("image_name", DataType::Utf8, false),
            Field::new("image", DataType::Utf8, false),
            Field::new("prediction", DataType::Utf8, false),
            Field::new("slice_count", DataType::UInt32, false),
            Field::new("iph_predicted_volume_ml", DataType::Float64, false),
            Field::new("eah_predicted_volume_ml", DataType::Float64, false),
            Field::new("oedema_predicted_volume_ml", DataType::Float64, false),
            Field::new("ivh_predicted_volume_ml", DataType::Float64, false),
            Field::new("quality_control_metric", DataType::Float64, false),
            Field::new("total_volume_scan", DataType::Float64, false),
            Field::new("total_volume_first_scan", DataType::Float64, false),
            Field::new("change_total_volume_scan", DataType::Float64, false),
            Field::new("iph_volume_first", DataType::Float64, false),
            Field::new("eah_volume_first", DataType::Float64, false),
            Field::new("ivh_volume_first", DataType::Float64, false),
            Field::new("change_iph_volume_first_scan", DataType::Float64, false),
            Field::new("change_eah_volume_first_scan", DataType::Float64, false),
            Field::new("change_ivh_volume_first_scan", DataType::Float64, false),
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
            floats(|r| r.quality_control_metric),
            floats(|r| r.total_volume_ml),
            floats(|r| r.first_scan_total_ml),
            floats(|r| r.change_total_ml),
            floats(|r| r.first_scan_volumes.iph),
            floats(|r| r.first_scan_volumes.eah),
            floats(|r| r.first_scan_volumes.ivh),
            floats(|r| r.change_from_first.iph),
            floats(|r| r.change_from_first.eah),
            floats(|r| r.change_from_first.ivh),
        ];

        Ok(RecordBatch::try_new(schema, columns)?)
    }
}
