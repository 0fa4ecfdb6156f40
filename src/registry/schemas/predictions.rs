//! Segmentation output schema definitions

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

/// Get the Arrow schema for the segmentation model's per-batch output
///
/// The model writes one row per run. The file also carries per-region
/// atlas breakdowns which the pipeline does not consume; only the columns
/// listed here are required.
pub fn predictions_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("image", DataType::Utf8, false),
        Field::new("prediction", DataType::Utf8, false),
        Field::new("iph_predicted_volume_ml", DataType::Float64, false),
        Field::new("eah_predicted_volume_ml", DataType::Float64, false),
        Field::new("oedema_predicted_volume_ml", DataType::Float64, false),
        Field::new("ivh_predicted_volume_ml", DataType::Float64, false),
        Field::new("quality_control_metric", DataType::Float64, true),
    ]))
}
