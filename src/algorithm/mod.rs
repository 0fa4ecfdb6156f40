//! Pipeline stage algorithms
//!
//! Each submodule implements one stage of the cohort build, in pipeline
//! order:
//!
//! 1. `reconcile` - attach stable identifiers to every study
//! 2. `localize` - resolve included studies to scan folders on disk
//! 3. `series` - select axial brain-window series from the header table
//! 4. `aggregate` - join segmentation outputs back to studies/sessions
//! 5. `dedup` - one record per imaging session
//! 6. `volumes` - longitudinal volume deltas from the first scan
//! 7. `inclusion` - final cohort with review annotations and outcomes
//! 8. `split` - seeded train/test split of the modeling table

pub mod aggregate;
pub mod dedup;
pub mod inclusion;
pub mod localize;
pub mod reconcile;
pub mod series;
pub mod split;
pub mod volumes;
