//! Segmentation output loader
//!
//! The segmentation model was run over the prepared scans in numbered
//! batches; each batch directory holds a `predictions/prediction.csv`.
//! All batches are concatenated into one record set.

use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use log::{info, warn};

use crate::error::Result;
use crate::models::PredictionRecord;
use crate::utils::io::read_csv;
use crate::utils::validate_directory;

/// Discover per-batch prediction files under the predictions directory,
/// ordered by batch number
pub fn find_prediction_files(dir: &Path) -> Result<Vec<PathBuf>> {
    validate_directory(dir)?;

    let mut numbered: Vec<(u32, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(number) = name
            .strip_prefix("batch_")
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        let prediction_file = path.join("predictions").join("prediction.csv");
        if prediction_file.is_file() {
            numbered.push((number, prediction_file));
        } else {
            warn!(
                "Batch directory {} has no predictions/prediction.csv",
                path.display()
            );
        }
    }

    numbered.sort_by_key(|(number, _)| *number);
    Ok(numbered.into_iter().map(|(_, path)| path).collect())
}

/// Load every batch's predictions and concatenate them
pub fn load(dir: &Path) -> Result<Vec<PredictionRecord>> {
    let files = find_prediction_files(dir)?;
    info!("Found {} prediction batches under {}", files.len(), dir.display());

    let mut records = Vec::new();
    for file in &files {
        let batches = read_csv(file)?;
        for batch in &batches {
            records.extend(deserialize_batch(batch)?);
        }
    }

    info!("Loaded {} prediction records", records.len());
    Ok(records)
}

/// Deserialize one record batch of prediction rows.
///
/// The batch may carry many more columns than the record type (per-region
/// atlas breakdowns); extras are ignored.
pub fn deserialize_batch(batch: &RecordBatch) -> Result<Vec<PredictionRecord>> {
    let records: Vec<PredictionRecord> = serde_arrow::from_record_batch(batch)?;
    Ok(records)
}
