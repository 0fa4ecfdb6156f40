//! IO utilities for file operations
//!
//! This module provides utilities for working with the pipeline's file
//! formats: CSV artifacts (through Arrow) and the XLSX review workbooks.

pub mod csv;
pub mod xlsx;

// Re-export commonly used functions for convenience
pub use csv::{concat, read_csv, read_csv_with_schema, write_csv, write_lines};
pub use xlsx::{read_first_sheet_batch, read_sheet_batch};
