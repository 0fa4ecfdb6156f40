//! Axial brain-window series selection
//!
//! Filters the wide DICOM header table down to the series worth
//! segmenting: axial acquisitions, not obviously of another body region,
//! displayed with a brain-tissue window.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use rustc_hash::FxHashSet;

use crate::dicom::parse_multi_valued_number;
use crate::error::Result;
use crate::filter::{BatchFilter, Expr, ExpressionFilter, LiteralValue};

/// Path keywords that identify non-brain acquisitions
pub const NON_BRAIN_KEYWORDS: &[&str] = &[
    "coronal",
    "sag",
    "chest",
    "abdomen",
    "spine",
    "facial_bones",
    "lung",
];

/// Window-center ceiling for a brain-tissue window, in HU
pub const BRAIN_WINDOW_CENTER_MAX: f64 = 100.0;
/// Window-width ceiling for a brain-tissue window, in HU
pub const BRAIN_WINDOW_WIDTH_MAX: f64 = 400.0;

/// The selected series table and the folder list for image conversion
#[derive(Debug, Clone)]
pub struct SeriesSelection {
    /// Header rows of the selected series, with the parsed window columns
    /// appended
    pub table: RecordBatch,
    /// Series directory paths, deduplicated, in table order
    pub folders: Vec<String>,
}

/// Select axial brain-window series from the wide header table
pub fn select_axial_brain_windows(headers: &RecordBatch) -> Result<SeriesSelection> {
    info!("Selecting series from {} header rows", headers.num_rows());

    // Axial acquisitions only.
    let axial = ExpressionFilter::new(Expr::ContainsIgnoreCase(
        "Image Type".to_string(),
        "AXIAL".to_string(),
    ))
    .filter(headers)?;
    info!(
        "{} axial rows, {} unique accession numbers",
        axial.num_rows(),
        count_unique(&axial, "Accession Number")
    );

    // Drop series whose path names another body region.
    let non_brain = Expr::Or(
        NON_BRAIN_KEYWORDS
            .iter()
            .map(|keyword| {
                Expr::ContainsIgnoreCase("file_path".to_string(), (*keyword).to_string())
            })
            .collect(),
    );
    let brain = ExpressionFilter::new(Expr::Not(Box::new(non_brain))).filter(&axial)?;
    info!("{} axial brain rows", brain.num_rows());

    // Parse the window display attributes and keep brain-tissue windows.
    let with_windows = append_window_columns(&brain)?;
    let windowed = ExpressionFilter::new(Expr::And(vec![
        Expr::LtEq(
            "first_center_number".to_string(),
            LiteralValue::Float(BRAIN_WINDOW_CENTER_MAX),
        ),
        Expr::LtEq(
            "first_width_number".to_string(),
            LiteralValue::Float(BRAIN_WINDOW_WIDTH_MAX),
        ),
    ]))
    .filter(&with_windows)?;

    let folders = unique_folders(&windowed)?;
    info!(
        "{} brain-window rows across {} unique folders, {} unique accession numbers",
        windowed.num_rows(),
        folders.len(),
        count_unique(&windowed, "Accession Number")
    );

    Ok(SeriesSelection {
        table: windowed,
        folders,
    })
}

/// Append `first_center_number` / `first_width_number` columns parsed
/// from the stringified window attributes. Multi-valued attributes take
/// their first element; unparseable or missing values become null.
fn append_window_columns(batch: &RecordBatch) -> Result<RecordBatch> {
    let centers = parse_first_numbers(batch, "Window Center");
    let widths = parse_first_numbers(batch, "Window Width");

    let mut fields: Vec<Field> = batch.schema().fields().iter().map(|f| (**f).clone()).collect();
    fields.push(Field::new("first_center_number", DataType::Float64, true));
    fields.push(Field::new("first_width_number", DataType::Float64, true));

    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns.push(Arc::new(centers));
    columns.push(Arc::new(widths));

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

fn parse_first_numbers(batch: &RecordBatch, column: &str) -> Float64Array {
    let Ok(idx) = batch.schema().index_of(column) else {
        return Float64Array::from(vec![None; batch.num_rows()]);
    };
    let Some(values) = batch.column(idx).as_any().downcast_ref::<StringArray>() else {
        return Float64Array::from(vec![None; batch.num_rows()]);
    };

    (0..values.len())
        .map(|row| {
            if values.is_null(row) {
                None
            } else {
                parse_multi_valued_number(values.value(row)).first().copied()
            }
        })
        .collect()
}

fn unique_folders(batch: &RecordBatch) -> Result<Vec<String>> {
    let idx = batch.schema().index_of("file_path").map_err(|_| {
        crate::error::Error::ColumnNotFound {
            column: "file_path".to_string(),
        }
    })?;
    let paths = crate::utils::arrow::downcast_array::<StringArray>(
        &batch.column(idx).clone(),
        "file_path",
        "String",
    )?
    .clone();

    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut folders = Vec::new();
    for row in 0..paths.len() {
        if paths.is_null(row) {
            continue;
        }
        let path = paths.value(row).to_string();
        if seen.insert(path.clone()) {
            folders.push(path);
        }
    }
    Ok(folders)
}

fn count_unique(batch: &RecordBatch, column: &str) -> usize {
    let Ok(idx) = batch.schema().index_of(column) else {
        return 0;
    };
    let Some(values) = batch.column(idx).as_any().downcast_ref::<StringArray>() else {
        return 0;
    };
    let mut unique: FxHashSet<&str> = FxHashSet::default();
    for row in 0..values.len() {
        if !values.is_null(row) {
            unique.insert(values.value(row));
        }
    }
    unique.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::UInt32Array;

    fn header_batch(rows: &[(&str, &str, Option<&str>, Option<&str>)]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("file_path", DataType::Utf8, false),
            Field::new("slice_count", DataType::UInt32, false),
            Field::new("Image Type", DataType::Utf8, true),
            Field::new("Accession Number", DataType::Utf8, true),
            Field::new("Window Center", DataType::Utf8, true),
            Field::new("Window Width", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(rows.iter().map(|r| Some(r.0)).collect::<StringArray>()),
                Arc::new(rows.iter().map(|_| Some(40u32)).collect::<UInt32Array>()),
                Arc::new(rows.iter().map(|r| Some(r.1)).collect::<StringArray>()),
                Arc::new(rows.iter().map(|_| Some("ACC1")).collect::<StringArray>()),
                Arc::new(rows.iter().map(|r| r.2).collect::<StringArray>()),
                Arc::new(rows.iter().map(|r| r.3).collect::<StringArray>()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn keeps_only_axial_brain_windows() {
        let batch = header_batch(&[
            // Selected: axial, brain path, brain window.
            ("/img/a/random/head_h41/x", "AXIAL\\PRIMARY", Some("40"), Some("80")),
            // Wrong plane.
            ("/img/b/random/head/x", "CORONAL", Some("40"), Some("80")),
            // Non-brain keyword in path.
            ("/img/c/random/chest_axial/x", "AXIAL", Some("40"), Some("80")),
            // Bone window.
            ("/img/d/random/head_bone/x", "AXIAL", Some("600"), Some("2800")),
            // Multi-valued window, first value wins.
            ("/img/e/random/head/x", "axial", Some("[35, 700]"), Some("[100, 3000]")),
            // Missing window attributes drop out.
            ("/img/f/random/head/x", "AXIAL", None, None),
        ]);

        let selection = select_axial_brain_windows(&batch).unwrap();
        assert_eq!(selection.folders.len(), 2);
        assert_eq!(selection.folders[0], "/img/a/random/head_h41/x");
        assert_eq!(selection.folders[1], "/img/e/random/head/x");
    }
}
