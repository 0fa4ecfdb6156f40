//! XLSX sheet reading
//!
//! The manual review annotations live in Excel workbooks with named
//! sheets. A sheet is converted to an Arrow record batch so the same
//! column extractors work for spreadsheet and CSV inputs alike: a column
//! whose populated cells are all numeric (or boolean) becomes `Float64`,
//! anything else becomes `Utf8`, and blank cells become nulls.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use calamine::{open_workbook, Data, Reader, Xlsx};
use log::info;

use crate::error::{Error, Result};

/// Read the first sheet of an XLSX workbook into a record batch
///
/// # Errors
/// Returns an error if the workbook cannot be opened or has no sheets.
pub fn read_first_sheet_batch(path: &Path) -> Result<RecordBatch> {
    let workbook: Xlsx<_> = open_workbook(path)?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::SheetNotFound {
            sheet: "<first>".to_string(),
            path: path.to_path_buf(),
        })?;
    read_sheet_batch(path, &first)
}

/// Read one named sheet of an XLSX workbook into a record batch
///
/// The first row of the sheet is taken as the header row. Columns with an
/// empty header cell are skipped.
///
/// # Errors
/// Returns an error if the workbook cannot be opened or the sheet is
/// missing.
pub fn read_sheet_batch(path: &Path, sheet: &str) -> Result<RecordBatch> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;

    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(Error::SheetNotFound {
            sheet: sheet.to_string(),
            path: path.to_path_buf(),
        });
    }

    let range = workbook.worksheet_range(sheet)?;
    let mut rows = range.rows();

    let Some(header_row) = rows.next() else {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    };

    let headers: Vec<(usize, String)> = header_row
        .iter()
        .enumerate()
        .filter_map(|(idx, cell)| {
            let name = cell_to_string(cell)?;
            let trimmed = name.trim();
            (!trimmed.is_empty()).then(|| (idx, trimmed.to_string()))
        })
        .collect();

    let data_rows: Vec<&[Data]> = rows.collect();

    let mut fields = Vec::with_capacity(headers.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(headers.len());

    for (idx, name) in &headers {
        let cells: Vec<&Data> = data_rows
            .iter()
            .map(|row| row.get(*idx).unwrap_or(&Data::Empty))
            .collect();

        if cells
            .iter()
            .copied()
            .all(|cell| cell_to_number(cell).is_some() || is_blank(cell))
        {
            let values: Float64Array = cells.iter().copied().map(cell_to_number).collect();
            fields.push(Field::new(name, DataType::Float64, true));
            columns.push(Arc::new(values));
        } else {
            let values: StringArray = cells.iter().copied().map(cell_to_string).collect();
            fields.push(Field::new(name, DataType::Utf8, true));
            columns.push(Arc::new(values));
        }
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema, columns)?;
    info!(
        "Read sheet '{}' from {}: {} rows, {} columns",
        sheet,
        path.display(),
        batch.num_rows(),
        batch.num_columns()
    );
    Ok(batch)
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_to_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(v) => Some(*v),
        Data::Int(v) => Some(*v as f64),
        Data::Bool(v) => Some(f64::from(*v)),
        _ => None,
    }
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Data::Float(v) => Some(format_float(*v)),
        Data::Int(v) => Some(v.to_string()),
        Data::Bool(v) => Some(v.to_string()),
        Data::DateTime(dt) => Some(format_float(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Error(e) => Some(format!("{e:?}")),
    }
}

/// Render whole floats without the trailing `.0` Excel gives numeric ids
fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}
