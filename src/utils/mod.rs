//! Utility functions shared across pipeline stages

pub mod arrow;
pub mod io;
pub mod logging;

use std::path::Path;

use crate::error::Result;

/// Validates that a directory exists and is a directory
///
/// # Arguments
/// * `dir` - The directory path to check
///
/// # Returns
/// `Ok(())` if the directory exists, otherwise an error
///
/// # Errors
/// Returns an error if the directory does not exist or is not a directory
pub fn validate_directory(dir: &Path) -> Result<()> {
    if !dir.exists() || !dir.is_dir() {
        return Err(crate::error::Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory does not exist: {}", dir.display()),
        )));
    }
    Ok(())
}

/// Remove every ASCII space from a string.
///
/// Joining folder names onto image roots in the transfer manifests leaves
/// embedded spaces that break path lookups downstream.
#[must_use]
pub fn squeeze_whitespace(s: &str) -> String {
    s.chars().filter(|c| *c != ' ').collect()
}
