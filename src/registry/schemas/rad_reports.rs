//! Radiology report export schema definitions

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

/// Get the Arrow schema for the annotated radiology report export
///
/// Reports were annotated by a keyword-matching pass; each keyword column
/// holds a 0/1 hit flag. Header names are taken after whitespace trimming
/// (the export writes some with surrounding spaces).
pub fn rad_reports_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("accession", DataType::Utf8, false),
        Field::new("order_reason", DataType::Utf8, true),
        Field::new("trauma", DataType::Float64, true),
        Field::new("fall", DataType::Float64, true),
        Field::new("injury", DataType::Float64, true),
        Field::new("assault", DataType::Float64, true),
        Field::new("auto", DataType::Float64, true),
        Field::new("any trauma", DataType::Float64, true),
        Field::new("hemorrhage", DataType::Float64, true),
        Field::new("posttraumatic hemorrhage", DataType::Float64, true),
        Field::new("report", DataType::Utf8, true),
    ]))
}
