//! Expected schema definitions for the clinical exports

pub mod identifiers;
pub mod image_index;
pub mod inclusion_list;
pub mod predictions;
pub mod rad_reports;

pub use identifiers::identifiers_schema;
pub use image_index::image_index_schema;
pub use inclusion_list::inclusion_list_schema;
pub use predictions::predictions_schema;
pub use rad_reports::rad_reports_schema;
