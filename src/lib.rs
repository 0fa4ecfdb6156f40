//! A Rust library for building the TBI hemorrhage-expansion study cohort
//! from clinical exports: identifier reconciliation, scan localization,
//! DICOM header abstraction, series selection, segmentation-volume
//! aggregation, cohort inclusion, and train/test preparation.

pub mod accession;
pub mod algorithm;
pub mod config;
pub mod dicom;
pub mod error;
pub mod filter;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod utils;

// Re-export the most common types for easier use
// Core types
pub use config::{ManifestBatch, PipelineConfig};
pub use error::{Error, Result};
pub use models::{
    CohortRecord, CompartmentVolumes, PredictionRecord, ScanFolder, ScanVolumeRecord, StudyRecord,
};

// Arrow types
pub use arrow::datatypes::Schema as ArrowSchema;
pub use arrow::record_batch::RecordBatch;

// Filtering capabilities
pub use filter::{filter_record_batch, Expr, ExpressionFilter, LiteralValue};

// Pipeline stages
pub use algorithm::dedup::dedup_sessions;
pub use algorithm::inclusion::build_cohort;
pub use algorithm::localize::localize;
pub use algorithm::reconcile::reconcile;
pub use algorithm::series::select_axial_brain_windows;
pub use algorithm::split::train_test_split;
pub use algorithm::volumes::compute_volume_deltas;
