//! Curated inclusion list schema definitions

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

/// Get the Arrow schema for the curated scans-to-include list
///
/// One row per study selected for the cohort after report review.
pub fn inclusion_list_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("unique_study_id", DataType::Utf8, false),
        Field::new("report_num_temp", DataType::Utf8, false),
        Field::new("SearchAccession", DataType::Utf8, true),
        Field::new("VNAAccession", DataType::Utf8, true),
        Field::new("EDWAccession", DataType::Utf8, true),
        Field::new("StudyID", DataType::Utf8, true),
        Field::new("StudyDate_Time_format", DataType::Utf8, true),
        Field::new("flag_post_trauma_hem", DataType::Float64, true),
    ]))
}
