//! Image index schema definitions

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

/// Get the Arrow schema for the image index export
///
/// The image index is a bulk archive extraction of brain CT studies over
/// the study's date range, one row per accession.
pub fn image_index_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("SearchAccession", DataType::Utf8, false),
        Field::new("VNAAccession", DataType::Utf8, true),
        Field::new("EDWAccession", DataType::Utf8, false),
        Field::new("StudyID", DataType::Utf8, true),
        Field::new("StudyDescription", DataType::Utf8, true),
        Field::new("StudyDate", DataType::Utf8, true), // YYYYMMDD
        Field::new("StudyTime", DataType::Utf8, true), // HHMMSS[.ffffff]
        Field::new("SUIDs", DataType::Utf8, true),     // Series instance UIDs
    ]))
}
