//! DICOM header abstraction
//!
//! Each localized scan folder holds one or more series directories of
//! `CT.*` instance files. Header abstraction walks the folders, reads one
//! representative instance per series directory, and records every data
//! element (pixel data excluded) as a long-form row. The long table is
//! pivoted to one row per series directory for the selection stage.
//!
//! Reading a whole archive's headers takes time; series directories are
//! processed in parallel with a progress bar.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use dicom_core::dictionary::DataDictionary;
use dicom_core::header::Header;
use dicom_dictionary_std::StandardDataDictionary;
use dicom_object::OpenFileOptions;
use indicatif::ParallelProgressIterator;
use log::{info, warn};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use walkdir::WalkDir;

use crate::error::Result;
use crate::utils::logging::create_main_progress_bar;

/// File-name prefix of CT instance files inside a series directory
const INSTANCE_PREFIX: &str = "CT.";

/// One DICOM data element of a series' representative instance
#[derive(Debug, Clone)]
pub struct HeaderRecord {
    /// Hex-formatted tag group
    pub group: String,
    /// Hex-formatted tag element
    pub element: String,
    /// Dictionary name of the attribute, or the formatted tag when the
    /// dictionary has no entry
    pub description: String,
    /// Value representation
    pub vr: String,
    /// Stringified element value
    pub value: String,
}

/// Header of one series directory: its elements plus the instance count
#[derive(Debug, Clone)]
pub struct SeriesHeader {
    /// Series directory path, the key of the wide header table
    pub file_path: String,
    /// Number of instance files in the directory
    pub slice_count: u32,
    pub elements: Vec<HeaderRecord>,
}

/// One discovered series directory with its representative instance
#[derive(Debug, Clone)]
pub struct SeriesLocation {
    pub dir: PathBuf,
    /// Lexicographically first instance file, read for the header
    pub first_instance: PathBuf,
    pub instance_count: u32,
}

/// Discover series directories under the localized scan folders
///
/// A series directory is any directory containing at least one `CT.*`
/// instance file. Folders that cannot be walked are logged and skipped:
/// a missing transfer shows up as an unmatched folder downstream, not as
/// a failed run.
pub fn find_series(scan_folders: &[String]) -> Vec<SeriesLocation> {
    let mut by_dir: FxHashMap<PathBuf, Vec<PathBuf>> = FxHashMap::default();

    // The localized scan list can name one folder several times (one row
    // per matched study); each root is walked once.
    let mut walked: FxHashSet<&str> = FxHashSet::default();
    for folder in scan_folders {
        if !walked.insert(folder.as_str()) {
            continue;
        }
        let root = Path::new(folder);
        if !root.is_dir() {
            warn!("Scan folder does not exist: {folder}");
            continue;
        }
        for entry in WalkDir::new(root).into_iter().filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry under {folder}: {err}");
                None
            }
        }) {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with(INSTANCE_PREFIX) {
                by_dir
                    .entry(entry.path().parent().unwrap_or(root).to_path_buf())
                    .or_default()
                    .push(entry.path().to_path_buf());
            }
        }
    }

    let mut series: Vec<SeriesLocation> = by_dir
        .into_iter()
        .map(|(dir, mut instances)| {
            instances.sort();
            SeriesLocation {
                first_instance: instances[0].clone(),
                instance_count: instances.len() as u32,
                dir,
            }
        })
        .collect();
    series.sort_by(|a, b| a.dir.cmp(&b.dir));

    info!(
        "Found {} series directories under {} scan folders",
        series.len(),
        scan_folders.len()
    );
    series
}

/// Read the header of one series' representative instance
///
/// Pixel data is skipped; everything else is recorded with its dictionary
/// name, VR, and stringified value.
pub fn read_series_header(location: &SeriesLocation) -> Result<SeriesHeader> {
    let obj = OpenFileOptions::new()
        .open_file(&location.first_instance)
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to open DICOM file {}: {e}",
                location.first_instance.display()
            )
        })?;

    let mut elements = Vec::new();
    for element in obj.iter() {
        let tag = element.tag();
        if tag == dicom_dictionary_std::tags::PIXEL_DATA {
            continue;
        }
        let description = StandardDataDictionary
            .by_tag(tag)
            .map(|entry| entry.alias.to_string())
            .unwrap_or_else(|| format!("({:04X},{:04X})", tag.group(), tag.element()));

        let value = match element.to_str() {
            Ok(text) => text.to_string(),
            Err(_) => format!("{:?}", element.value()),
        };

        elements.push(HeaderRecord {
            group: format!("{:04X}", tag.group()),
            element: format!("{:04X}", tag.element()),
            description,
            vr: element.vr().to_string().into(),
            value,
        });
    }

    Ok(SeriesHeader {
        file_path: location.dir.to_string_lossy().to_string(),
        slice_count: location.instance_count,
        elements,
    })
}

/// Extract headers for every series directory, in parallel
///
/// Series whose representative instance cannot be read are logged and
/// dropped from the result.
pub fn extract_headers(series: &[SeriesLocation]) -> Vec<SeriesHeader> {
    let progress = create_main_progress_bar(series.len() as u64, Some("Abstracting DICOM headers"));

    let headers: Vec<SeriesHeader> = series
        .par_iter()
        .progress_with(progress)
        .filter_map(|location| match read_series_header(location) {
            Ok(header) => Some(header),
            Err(err) => {
                warn!("Failed to read header for {}: {err}", location.dir.display());
                None
            }
        })
        .collect();

    info!(
        "Abstracted headers for {} of {} series directories",
        headers.len(),
        series.len()
    );
    headers
}

/// Convert headers to the long-form record batch
/// (`file_path, Group, Elem, Description, VR, value`)
pub fn to_long_batch(headers: &[SeriesHeader]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("file_path", DataType::Utf8, false),
        Field::new("Group", DataType::Utf8, false),
        Field::new("Elem", DataType::Utf8, false),
        Field::new("Description", DataType::Utf8, false),
        Field::new("VR", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, true),
    ]));

    let mut file_paths = Vec::new();
    let mut groups = Vec::new();
    let mut elems = Vec::new();
    let mut descriptions = Vec::new();
    let mut vrs = Vec::new();
    let mut values = Vec::new();

    for header in headers {
        for element in &header.elements {
            file_paths.push(Some(header.file_path.clone()));
            groups.push(Some(element.group.clone()));
            elems.push(Some(element.element.clone()));
            descriptions.push(Some(element.description.clone()));
            vrs.push(Some(element.vr.clone()));
            values.push(Some(element.value.clone()));
        }
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(file_paths.into_iter().collect::<StringArray>()),
        Arc::new(groups.into_iter().collect::<StringArray>()),
        Arc::new(elems.into_iter().collect::<StringArray>()),
        Arc::new(descriptions.into_iter().collect::<StringArray>()),
        Arc::new(vrs.into_iter().collect::<StringArray>()),
        Arc::new(values.into_iter().collect::<StringArray>()),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Pivot headers into the wide table: one row per series directory, one
/// column per attribute description, plus the derived `slice_count`.
///
/// The first value wins when an instance repeats a description.
pub fn pivot_headers(headers: &[SeriesHeader]) -> Result<RecordBatch> {
    // Stable column order: first appearance across the input.
    let mut attribute_order: Vec<String> = Vec::new();
    let mut seen: FxHashMap<&str, usize> = FxHashMap::default();
    for header in headers {
        for element in &header.elements {
            if !seen.contains_key(element.description.as_str()) {
                seen.insert(element.description.as_str(), attribute_order.len());
                attribute_order.push(element.description.clone());
            }
        }
    }

    let mut fields = vec![
        Field::new("file_path", DataType::Utf8, false),
        Field::new("slice_count", DataType::UInt32, false),
    ];
    for attribute in &attribute_order {
        fields.push(Field::new(attribute, DataType::Utf8, true));
    }
    let schema = Arc::new(Schema::new(fields));

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(attribute_order.len() + 2);
    columns.push(Arc::new(
        headers
            .iter()
            .map(|h| Some(h.file_path.as_str()))
            .collect::<StringArray>(),
    ));
    columns.push(Arc::new(
        headers
            .iter()
            .map(|h| Some(h.slice_count))
            .collect::<UInt32Array>(),
    ));

    for attribute in &attribute_order {
        let values: StringArray = headers
            .iter()
            .map(|header| {
                header
                    .elements
                    .iter()
                    .find(|element| &element.description == attribute)
                    .map(|element| element.value.as_str())
            })
            .collect();
        columns.push(Arc::new(values));
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Parse a possibly multi-valued numeric DICOM attribute value.
///
/// Display attributes like Window Center arrive as a plain number
/// (`40`), a backslash-separated multi-value (`40\80`), or a bracketed
/// list (`[40, 80]`) depending on how the header was stringified.
#[must_use]
pub fn parse_multi_valued_number(raw: &str) -> SmallVec<[f64; 2]> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(|c| c == '\\' || c == ',')
        .filter_map(|part| part.trim().trim_matches('\'').parse::<f64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    #[test]
    fn parses_scalar_and_multi_valued_windows() {
        assert_eq!(parse_multi_valued_number("40").as_slice(), &[40.0]);
        assert_eq!(parse_multi_valued_number("40\\80").as_slice(), &[40.0, 80.0]);
        assert_eq!(parse_multi_valued_number("[40, 80]").as_slice(), &[40.0, 80.0]);
        assert_eq!(parse_multi_valued_number("'35.0'").as_slice(), &[35.0]);
        assert!(parse_multi_valued_number("n/a").is_empty());
    }

    #[test]
    fn pivot_is_one_row_per_series() {
        let headers = vec![
            SeriesHeader {
                file_path: "/images/a/series1".to_string(),
                slice_count: 42,
                elements: vec![
                    HeaderRecord {
                        group: "0008".to_string(),
                        element: "0008".to_string(),
                        description: "Image Type".to_string(),
                        vr: "CS".to_string(),
                        value: "ORIGINAL\\PRIMARY\\AXIAL".to_string(),
                    },
                    HeaderRecord {
                        group: "0028".to_string(),
                        element: "1050".to_string(),
                        description: "Window Center".to_string(),
                        vr: "DS".to_string(),
                        value: "40".to_string(),
                    },
                ],
            },
            SeriesHeader {
                file_path: "/images/b/series1".to_string(),
                slice_count: 37,
                elements: vec![HeaderRecord {
                    group: "0008".to_string(),
                    element: "0008".to_string(),
                    description: "Image Type".to_string(),
                    vr: "CS".to_string(),
                    value: "ORIGINAL\\PRIMARY\\CORONAL".to_string(),
                }],
            },
        ];

        let batch = pivot_headers(&headers).unwrap();
        assert_eq!(batch.num_rows(), 2);
        // file_path + slice_count + two attribute columns
        assert_eq!(batch.num_columns(), 4);
        let window = batch
            .column(batch.schema().index_of("Window Center").unwrap())
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
            .clone();
        assert_eq!(window.value(0), "40");
        assert!(window.is_null(1));
    }
}
