//! CSV file operations
//!
//! This module provides utilities for reading and writing CSV files as
//! Arrow record batches. Reading either infers the schema from the file
//! or applies a caller-supplied schema; writing always emits a header row.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::error::Result;
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Default batch size for CSV reading
pub const DEFAULT_BATCH_SIZE: usize = 16384;

/// Read a CSV file into record batches, inferring the schema
///
/// # Arguments
/// * `path` - The CSV file to read
///
/// # Returns
/// The record batches read from the file
///
/// # Errors
/// Returns an error if the file cannot be opened or parsed
pub fn read_csv(path: &Path) -> Result<Vec<RecordBatch>> {
    let format = Format::default().with_header(true);
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let (schema, _) = format
        .infer_schema(&mut file, None)
        .with_context(|| format!("Failed to infer schema of {}", path.display()))?;
    read_csv_with_schema(path, Arc::new(schema))
}

/// Read a CSV file into record batches with an explicit schema
///
/// # Arguments
/// * `path` - The CSV file to read
/// * `schema` - The schema to apply to the file
///
/// # Returns
/// The record batches read from the file
///
/// # Errors
/// Returns an error if the file cannot be opened or a row does not match
/// the schema
pub fn read_csv_with_schema(path: &Path, schema: SchemaRef) -> Result<Vec<RecordBatch>> {
    log_operation_start("Reading CSV", path);
    let start = Instant::now();

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = ReaderBuilder::new(schema)
        .with_header(true)
        .with_batch_size(DEFAULT_BATCH_SIZE)
        .build(file)?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }

    let rows = batches.iter().map(RecordBatch::num_rows).sum();
    log_operation_complete("read", path, rows, Some(start.elapsed()));
    Ok(batches)
}

/// Concatenate record batches that share a schema into a single batch
///
/// # Errors
/// Returns an error if the batches disagree on schema
pub fn concat(schema: &SchemaRef, batches: &[RecordBatch]) -> Result<RecordBatch> {
    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema.clone()));
    }
    Ok(arrow::compute::concat_batches(schema, batches)?)
}

/// Write record batches to a CSV file with a header row
///
/// The parent directory is created if it does not exist.
///
/// # Arguments
/// * `path` - The destination file
/// * `batches` - The record batches to write
///
/// # Errors
/// Returns an error if the file cannot be created or written
pub fn write_csv(path: &Path, batches: &[RecordBatch]) -> Result<()> {
    log_operation_start("Writing CSV", path);
    let start = Instant::now();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    for batch in batches {
        writer.write(batch)?;
    }

    let rows = batches.iter().map(RecordBatch::num_rows).sum();
    log_operation_complete("wrote", path, rows, Some(start.elapsed()));
    Ok(())
}

/// Write a list of lines to a plain text file, one per line
///
/// # Errors
/// Returns an error if the file cannot be created or written
pub fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
