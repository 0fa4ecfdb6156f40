//! Source definitions and loaders for the clinical exports
//!
//! This module contains loaders for the external files the pipeline
//! consumes. It provides a unified interface for reading each export into
//! Arrow record batches and deserializing rows into typed records.
//!
//! Available sources:
//! - Image index: archive export of brain CT studies with accession aliases
//! - Radiology reports: keyword-annotated report export (XLSX)
//! - Identifiers: master list mapping accession aliases to `unique_study_id`
//! - Inclusion list: curated studies/scans selected for the cohort
//! - Manifests: pipe-delimited transfer lists mapping accessions to folders
//! - Predictions: per-batch segmentation-model outputs
//! - Review: manual-review workbook sheets (inclusion, exclusions,
//!   image overrides, chart review)

pub mod identifiers;
pub mod image_index;
pub mod inclusion_list;
pub mod manifest;
pub mod predictions;
pub mod rad_reports;
pub mod review;
pub mod schemas;

use std::path::Path;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use log::warn;

use crate::error::Result;
use crate::utils::io::read_csv;

/// Base trait for tabular source loaders
///
/// A source knows its name, the columns a well-formed export carries, and
/// how to read itself into record batches. Column layouts drift between
/// snapshot exports, so loading only warns about missing expected columns;
/// the row deserializers decide what is actually required.
pub trait TableSource {
    /// Get the name of the source
    fn source_name(&self) -> &'static str;

    /// Get the expected schema for this source
    fn schema(&self) -> SchemaRef;

    /// Load records from the source file
    fn load(&self, path: &Path) -> Result<Vec<RecordBatch>> {
        let batches = read_csv(path)?;
        if let Some(first) = batches.first() {
            warn_missing_columns(self.source_name(), &self.schema(), first);
        }
        Ok(batches)
    }
}

/// Warn about expected columns absent from a loaded batch
pub(crate) fn warn_missing_columns(source: &str, expected: &SchemaRef, batch: &RecordBatch) {
    for field in expected.fields() {
        if batch.schema().index_of(field.name()).is_err() {
            warn!(
                "Source '{}' is missing expected column '{}'",
                source,
                field.name()
            );
        }
    }
}
