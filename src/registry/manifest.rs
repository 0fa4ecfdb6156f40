//! Transfer manifest loader
//!
//! The file-transfer tool writes one pipe-delimited line per transferred
//! scan: `patient_id|accession|folder`, with no header row. Each batch
//! carries its own image root; `folder` joined onto it gives the on-disk
//! location of the scan.

use std::fs;
use std::path::Path;

use log::info;

use crate::accession::normalize;
use crate::config::ManifestBatch;
use crate::error::{Error, Result};
use crate::models::ManifestRow;
use crate::utils::squeeze_whitespace;

/// Load one manifest batch into rows
pub fn load_batch(batch: &ManifestBatch) -> Result<Vec<ManifestRow>> {
    let content = fs::read_to_string(&batch.manifest_path)?;
    let mut rows = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() != 3 {
            return Err(Error::Manifest {
                path: batch.manifest_path.clone(),
                line: idx + 1,
                reason: format!("expected 3 pipe-delimited fields, found {}", fields.len()),
            });
        }

        let folder = fields[2].trim().to_string();
        let file_path = squeeze_whitespace(
            &batch.image_root.join(&folder).to_string_lossy(),
        );
        let accession = fields[1].trim().to_string();

        rows.push(ManifestRow {
            patient_id: fields[0].trim().to_string(),
            accession_normalized: normalize(&accession),
            accession,
            folder,
            file_path,
            batch: batch.name.clone(),
        });
    }

    info!(
        "Manifest '{}': {} rows from {}",
        batch.name,
        rows.len(),
        batch.manifest_path.display()
    );
    Ok(rows)
}

/// Load all manifest batches, in the configured order
pub fn load_all(batches: &[ManifestBatch]) -> Result<Vec<ManifestRow>> {
    let mut rows = Vec::new();
    for batch in batches {
        rows.extend(load_batch(batch)?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_pipe_delimited_lines() {
        let dir = std::env::temp_dir().join("tbi_cohort_manifest_test");
        std::fs::create_dir_all(&dir).unwrap();
        let manifest_path = dir.join("LocalIdentifierList.txt");
        std::fs::write(
            &manifest_path,
            "P001|*NWMCT2021R12345|FOLDER A1\nP002|CT2021R54321|FOLDER_B2\n",
        )
        .unwrap();

        let batch = ManifestBatch {
            name: "batch1".to_string(),
            manifest_path,
            image_root: PathBuf::from("/share/images"),
        };
        let rows = load_batch(&batch).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].patient_id, "P001");
        assert_eq!(rows[0].accession_normalized, "21R12345");
        // Spaces in folder names do not survive into file paths.
        assert_eq!(rows[0].file_path, "/share/images/FOLDERA1");
        assert_eq!(rows[1].batch, "batch1");
    }

    #[test]
    fn rejects_malformed_lines() {
        let dir = std::env::temp_dir().join("tbi_cohort_manifest_test_bad");
        std::fs::create_dir_all(&dir).unwrap();
        let manifest_path = dir.join("LocalIdentifierList.txt");
        std::fs::write(&manifest_path, "only-one-field\n").unwrap();

        let batch = ManifestBatch {
            name: "bad".to_string(),
            manifest_path,
            image_root: PathBuf::from("/share/images"),
        };
        assert!(load_batch(&batch).is_err());
    }
}
