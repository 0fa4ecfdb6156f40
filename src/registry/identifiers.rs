//! Master identifier list loader

use std::path::Path;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::error::Result;
use crate::registry::schemas::identifiers_schema;
use crate::registry::TableSource;
use crate::utils::arrow::{extract_key, extract_string};

/// One alias-triple to `unique_study_id` assignment
#[derive(Debug, Clone)]
pub struct IdentifierRow {
    pub unique_study_id: String,
    pub search_accession: String,
    pub vna_accession: Option<String>,
    pub edw_accession: String,
}

/// Loader for the master identifier list
pub struct IdentifierSource;

impl TableSource for IdentifierSource {
    fn source_name(&self) -> &'static str {
        "identifiers"
    }

    fn schema(&self) -> SchemaRef {
        identifiers_schema()
    }
}

/// Load and deserialize the master identifier list
pub fn load(path: &Path) -> Result<Vec<IdentifierRow>> {
    let batches = IdentifierSource.load(path)?;
    let mut rows = Vec::new();
    for batch in &batches {
        rows.extend(deserialize_batch(batch)?);
    }
    Ok(rows)
}

/// Deserialize one record batch of identifier rows
pub fn deserialize_batch(batch: &RecordBatch) -> Result<Vec<IdentifierRow>> {
    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let Some(unique_study_id) = extract_key(batch, row, "unique_study_id", true)? else {
            continue;
        };
        let Some(search_accession) = extract_string(batch, row, "SearchAccession", true)? else {
            continue;
        };
        let Some(edw_accession) = extract_string(batch, row, "EDWAccession", true)? else {
            continue;
        };
        rows.push(IdentifierRow {
            unique_study_id,
            search_accession,
            vna_accession: extract_string(batch, row, "VNAAccession", false)?,
            edw_accession,
        });
    }
    Ok(rows)
}
