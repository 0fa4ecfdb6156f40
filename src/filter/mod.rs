//! Expression-based filtering for record batches
//!
//! The series-selection stage filters the wide DICOM header table with
//! attribute predicates. The filter engine evaluates a small expression
//! language against record batches using Arrow's vectorized kernels.

pub mod core;
pub mod expr;

pub use core::{filter_record_batch, BatchFilter};
pub use expr::{Expr, ExpressionFilter, LiteralValue};
