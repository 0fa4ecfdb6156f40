//! CSV artifact round-trips through the Arrow readers and writers.

use std::sync::Arc;

use arrow::array::{Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use tbi_cohort::utils::io::{read_csv, read_csv_with_schema, write_csv};

fn sample_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("unique_study_id", DataType::Utf8, false),
        Field::new("report_num_temp", DataType::Utf8, false),
        Field::new("iph_predicted_volume_ml", DataType::Float64, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec![Some("101"), Some("102")])),
            Arc::new(StringArray::from(vec![Some("CT2021R001"), Some("CT2021R002")])),
            Arc::new(Float64Array::from(vec![Some(4.25), None])),
        ],
    )
    .unwrap()
}

#[test]
fn write_then_read_with_schema_preserves_rows() {
    let dir = std::env::temp_dir().join("tbi_cohort_io_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("roundtrip.csv");

    let batch = sample_batch();
    write_csv(&path, &[batch.clone()]).unwrap();

    let batches = read_csv_with_schema(&path, batch.schema()).unwrap();
    let total_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    assert_eq!(total_rows, 2);

    let first = &batches[0];
    let ids = first
        .column(0)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(ids.value(0), "101");

    let volumes = first
        .column(2)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(volumes.value(0), 4.25);
    assert!(volumes.is_null(1));
}

#[test]
fn inferred_read_recovers_numeric_columns() {
    let dir = std::env::temp_dir().join("tbi_cohort_io_test_infer");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("inferred.csv");

    write_csv(&path, &[sample_batch()]).unwrap();
    let batches = read_csv(&path).unwrap();
    let first = &batches[0];

    let schema = first.schema();
    let volume_field = schema.field_with_name("iph_predicted_volume_ml").unwrap();
    assert_eq!(volume_field.data_type(), &DataType::Float64);
}
