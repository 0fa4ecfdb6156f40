//! Train/test preparation
//!
//! A seeded shuffle-and-split of the first-scan modeling table into
//! feature (X) and outcome (y) halves. Rows stay aligned between X and y,
//! and a patient appears in exactly one of the two splits.

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::Result;
use crate::models::CohortRecord;

/// The four split tables, with and without the patient identifier
#[derive(Debug, Clone)]
pub struct SplitTables {
    pub x_train: RecordBatch,
    pub x_test: RecordBatch,
    pub y_train: RecordBatch,
    pub y_test: RecordBatch,
}

/// Shuffle row indices with a seeded generator and split at the test
/// fraction. The test set takes `ceil(n * fraction)` rows.
#[must_use]
pub fn split_indices(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_size = ((n as f64) * test_fraction).ceil() as usize;
    let test = indices[..test_size.min(n)].to_vec();
    let train = indices[test_size.min(n)..].to_vec();
    (train, test)
}

/// Split the first-scan table into X/y train/test batches
pub fn train_test_split(
    first_scans: &[CohortRecord],
    thresholds: &[f64],
    test_fraction: f64,
    seed: u64,
) -> Result<SplitTables> {
    let (train, test) = split_indices(first_scans.len(), test_fraction, seed);
    info!(
        "Split {} patients into {} train / {} test (seed {seed})",
        first_scans.len(),
        train.len(),
        test.len()
    );

    let select = |indices: &[usize]| -> Vec<&CohortRecord> {
        indices.iter().map(|idx| &first_scans[*idx]).collect()
    };
    let train_records = select(&train);
    let test_records = select(&test);

    Ok(SplitTables {
        x_train: features_batch(&train_records)?,
        x_test: features_batch(&test_records)?,
        y_train: outcomes_batch(&train_records, thresholds)?,
        y_test: outcomes_batch(&test_records, thresholds)?,
    })
}

/// Feature columns: identifier, surgery annotations, censoring flag, and
/// the four first-scan volumes
fn features_batch(records: &[&CohortRecord]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("unique_study_id", DataType::Utf8, false),
        Field::new("surgery", DataType::Boolean, true),
        Field::new("surgery_type", DataType::Utf8, true),
        Field::new("second_scan_post_surgery_trauma", DataType::Boolean, false),
        Field::new("iph_predicted_volume_ml", DataType::Float64, false),
        Field::new("eah_predicted_volume_ml", DataType::Float64, false),
        Field::new("oedema_predicted_volume_ml", DataType::Float64, false),
        Field::new("ivh_predicted_volume_ml", DataType::Float64, false),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(
            records
                .iter()
                .map(|r| Some(r.scan.unique_study_id.as_str()))
                .collect::<StringArray>(),
        ),
        Arc::new(records.iter().map(|r| r.review.surgery).collect::<BooleanArray>()),
        Arc::new(
            records
                .iter()
                .map(|r| r.review.surgery_type.as_deref())
                .collect::<StringArray>(),
        ),
        Arc::new(
            records
                .iter()
                .map(|r| Some(r.review.second_scan_post_surgery))
                .collect::<BooleanArray>(),
        ),
        Arc::new(
            records
                .iter()
                .map(|r| Some(r.scan.volumes.iph))
                .collect::<Float64Array>(),
        ),
        Arc::new(
            records
                .iter()
                .map(|r| Some(r.scan.volumes.eah))
                .collect::<Float64Array>(),
        ),
        Arc::new(
            records
                .iter()
                .map(|r| Some(r.scan.volumes.oedema))
                .collect::<Float64Array>(),
        ),
        Arc::new(
            records
                .iter()
                .map(|r| Some(r.scan.volumes.ivh))
                .collect::<Float64Array>(),
        ),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Outcome columns: identifier, censoring flag, and one column per
/// threshold
fn outcomes_batch(records: &[&CohortRecord], thresholds: &[f64]) -> Result<RecordBatch> {
    let mut fields = vec![
        Field::new("unique_study_id", DataType::Utf8, false),
        Field::new("second_scan_post_surgery_trauma", DataType::Boolean, false),
    ];
    for threshold in thresholds {
        fields.push(Field::new(
            format!("outcome_{threshold}ml"),
            DataType::Boolean,
            true,
        ));
    }
    let schema = Arc::new(Schema::new(fields));

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(
            records
                .iter()
                .map(|r| Some(r.scan.unique_study_id.as_str()))
                .collect::<StringArray>(),
        ),
        Arc::new(
            records
                .iter()
                .map(|r| Some(r.review.second_scan_post_surgery))
                .collect::<BooleanArray>(),
        ),
    ];
    for (idx, _) in thresholds.iter().enumerate() {
        columns.push(Arc::new(
            records
                .iter()
                .map(|r| r.outcomes.get(idx).copied().flatten())
                .collect::<BooleanArray>(),
        ));
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Drop the identifier column from a split batch for the de-identified
/// artifacts
pub fn without_identifier(batch: &RecordBatch) -> Result<RecordBatch> {
    let idx = batch
        .schema()
        .index_of("unique_study_id")
        .map_err(|_| crate::error::Error::ColumnNotFound {
            column: "unique_study_id".to_string(),
        })?;
    let indices: Vec<usize> = (0..batch.num_columns()).filter(|i| *i != idx).collect();
    Ok(batch.project(&indices)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn seeded_split_is_reproducible_and_disjoint() {
        let (train_a, test_a) = split_indices(100, 0.3, 1300);
        let (train_b, test_b) = split_indices(100, 0.3, 1300);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);

        assert_eq!(train_a.len(), 70);
        assert_eq!(test_a.len(), 30);

        let train_set: FxHashSet<usize> = train_a.iter().copied().collect();
        assert!(test_a.iter().all(|idx| !train_set.contains(idx)));
    }

    #[test]
    fn different_seeds_differ() {
        let (_, test_a) = split_indices(100, 0.3, 1300);
        let (_, test_b) = split_indices(100, 0.3, 1301);
        assert_ne!(test_a, test_b);
    }

    #[test]
    fn small_tables_split_sanely() {
        let (train, test) = split_indices(1, 0.3, 7);
        assert_eq!(train.len() + test.len(), 1);
        let (train, test) = split_indices(0, 0.3, 7);
        assert!(train.is_empty());
        assert!(test.is_empty());
    }
}
