//! Arrow data handling utilities
//!
//! This module contains utilities for working with Arrow arrays, data types,
//! and record batches. It provides helpers for type conversion, data
//! extraction, and array manipulations.

pub mod array_utils;
pub mod extractors;

// Re-export commonly used functions for convenience
pub use array_utils::{downcast_array, get_column, get_column_by_name, get_column_index};
pub use extractors::{
    extract_bool_flag, extract_float64, extract_int64, extract_key, extract_string,
};
