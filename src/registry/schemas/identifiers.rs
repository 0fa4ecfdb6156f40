//! Master identifier list schema definitions

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

/// Get the Arrow schema for the master identifier list
///
/// The list assigns the stable de-identified `unique_study_id` to every
/// (SearchAccession, VNAAccession, EDWAccession) alias triple.
pub fn identifiers_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("unique_study_id", DataType::Utf8, false),
        Field::new("SearchAccession", DataType::Utf8, false),
        Field::new("VNAAccession", DataType::Utf8, true),
        Field::new("EDWAccession", DataType::Utf8, false),
    ]))
}
