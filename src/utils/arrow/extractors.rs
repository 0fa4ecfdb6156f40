//! Field extraction utilities for Arrow record batches
//!
//! This module provides high-level utilities for extracting typed field
//! values from Arrow record batches with appropriate error handling and
//! type conversion.

use crate::error::Result;
use crate::utils::arrow::array_utils::{downcast_array, get_column};
use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

/// Extract a string value from a record batch
///
/// # Arguments
///
/// * `batch` - The record batch to extract from
/// * `row` - The row index
/// * `column_name` - The name of the column
/// * `required` - Whether the column is required
///
/// # Returns
///
/// * `Ok(Some(String))` - The extracted string value
/// * `Ok(None)` - If the column is null or not present (and not required)
/// * `Err` - If an error occurs during extraction
pub fn extract_string(
    batch: &RecordBatch,
    row: usize,
    column_name: &str,
    required: bool,
) -> Result<Option<String>> {
    let array_opt = get_column(batch, column_name, &DataType::Utf8, required)?;

    if let Some(array) = array_opt {
        if array.data_type() != &DataType::Utf8 {
            return Ok(None);
        }
        let string_array = downcast_array::<StringArray>(&array, column_name, "String")?;

        if row < string_array.len() && !string_array.is_null(row) {
            let value = string_array.value(row).to_string();
            if !value.is_empty() {
                return Ok(Some(value));
            }
        }
    }

    Ok(None)
}

/// Extract an int64 value from a record batch
///
/// # Arguments
///
/// * `batch` - The record batch to extract from
/// * `row` - The row index
/// * `column_name` - The name of the column
/// * `required` - Whether the column is required
///
/// # Returns
///
/// * `Ok(Some(i64))` - The extracted integer value
/// * `Ok(None)` - If the column is null or not present (and not required)
/// * `Err` - If an error occurs during extraction
pub fn extract_int64(
    batch: &RecordBatch,
    row: usize,
    column_name: &str,
    required: bool,
) -> Result<Option<i64>> {
    let array_opt = get_column(batch, column_name, &DataType::Int64, required)?;

    if let Some(array) = array_opt {
        if array.data_type() != &DataType::Int64 {
            return Ok(None);
        }
        let int_array = downcast_array::<Int64Array>(&array, column_name, "Int64")?;

        if row < int_array.len() && !int_array.is_null(row) {
            return Ok(Some(int_array.value(row)));
        }
    }

    Ok(None)
}

/// Extract a float64 value from a record batch
///
/// # Arguments
///
/// * `batch` - The record batch to extract from
/// * `row` - The row index
/// * `column_name` - The name of the column
/// * `required` - Whether the column is required
///
/// # Returns
///
/// * `Ok(Some(f64))` - The extracted float value
/// * `Ok(None)` - If the column is null or not present (and not required)
/// * `Err` - If an error occurs during extraction
pub fn extract_float64(
    batch: &RecordBatch,
    row: usize,
    column_name: &str,
    required: bool,
) -> Result<Option<f64>> {
    let array_opt = get_column(batch, column_name, &DataType::Float64, required)?;

    if let Some(array) = array_opt {
        if array.data_type() != &DataType::Float64 {
            return Ok(None);
        }
        let float_array = downcast_array::<Float64Array>(&array, column_name, "Float64")?;

        if row < float_array.len() && !float_array.is_null(row) {
            return Ok(Some(float_array.value(row)));
        }
    }

    Ok(None)
}

/// Extract an identifier column as a string, whatever its physical type
///
/// Identifier columns (`unique_study_id`, accessions) arrive as text from
/// some exports and as numbers from others (CSV inference, spreadsheet
/// cells). Numeric values are rendered without a trailing `.0` so the two
/// forms produce the same join key.
///
/// # Returns
///
/// * `Ok(Some(String))` - The extracted identifier
/// * `Ok(None)` - If the column is null or not present (and not required)
/// * `Err` - If the column is required and missing
pub fn extract_key(
    batch: &RecordBatch,
    row: usize,
    column_name: &str,
    required: bool,
) -> Result<Option<String>> {
    let idx = match batch.schema().index_of(column_name) {
        Ok(idx) => idx,
        Err(_) => {
            if required {
                return Err(crate::error::Error::ColumnNotFound {
                    column: column_name.to_string(),
                });
            }
            return Ok(None);
        }
    };

    match batch.column(idx).data_type() {
        DataType::Float64 => Ok(extract_float64(batch, row, column_name, required)?
            .map(format_key_number)),
        DataType::Int64 => {
            Ok(extract_int64(batch, row, column_name, required)?.map(|v| v.to_string()))
        }
        _ => extract_string(batch, row, column_name, required),
    }
}

fn format_key_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// Extract a 0/1 annotation flag from a record batch
///
/// The review workbooks encode flags as numeric cells with blanks;
/// anything other than an exact 1 reads as unset.
///
/// # Returns
///
/// * `Ok(Some(true))` - The cell holds 1
/// * `Ok(Some(false))` - The cell holds any other number
/// * `Ok(None)` - If the column is null or not present (and not required)
pub fn extract_bool_flag(
    batch: &RecordBatch,
    row: usize,
    column_name: &str,
    required: bool,
) -> Result<Option<bool>> {
    if let Some(value) = extract_float64(batch, row, column_name, required)? {
        #[allow(clippy::float_cmp)]
        return Ok(Some(value == 1.0));
    }
    Ok(None)
}
