//! Domain models for the cohort pipeline
//!
//! Rows of the source exports and of the stage artifacts, as typed
//! records. Record batches are the interchange form at the IO boundary;
//! the algorithms work on these types.

pub mod cohort;
pub mod prediction;
pub mod scan;
pub mod study;

pub use cohort::{CohortRecord, ReviewAnnotations};
pub use prediction::{CompartmentVolumes, PredictionRecord, ScanVolumeRecord};
pub use scan::{InclusionRow, ManifestRow, MatchKey, ScanFolder};
pub use study::{KeywordFlags, StudyRecord};
