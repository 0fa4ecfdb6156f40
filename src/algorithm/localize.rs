//! Scan localization
//!
//! Resolves every study of the curated inclusion list to a scan folder on
//! disk using the transfer manifests. The primary join key is the
//! normalized report-number accession; studies the primary join misses are
//! retried on the normalized archive accession. Residual unmatched
//! studies are reported, never silently dropped from the summary.

use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::accession::normalize;
use crate::error::Result;
use crate::models::{InclusionRow, ManifestRow, MatchKey, ScanFolder};

/// Result of the fallback folder resolution
#[derive(Debug, Clone, Default)]
pub struct LocalizeSummary {
    /// Studies in the inclusion list
    pub expected: usize,
    /// Studies resolved by the primary accession join
    pub matched_primary: usize,
    /// Studies resolved by the archive-accession fallback
    pub matched_fallback: usize,
    /// Report numbers with no folder in either manifest
    pub unmatched: Vec<String>,
}

impl LocalizeSummary {
    /// Whether every expected study resolved to at least one folder
    #[must_use]
    pub fn fully_resolved(&self) -> bool {
        self.unmatched.is_empty()
    }
}

/// Resolve inclusion-list studies to scan folders
pub fn localize(
    inclusion: &[InclusionRow],
    manifests: &[ManifestRow],
) -> Result<(Vec<ScanFolder>, LocalizeSummary)> {
    let mut by_accession: FxHashMap<&str, Vec<&ManifestRow>> = FxHashMap::default();
    for row in manifests {
        by_accession
            .entry(row.accession_normalized.as_str())
            .or_default()
            .push(row);
    }

    let expected: FxHashSet<&str> = inclusion.iter().map(|r| r.report_num.as_str()).collect();
    let mut summary = LocalizeSummary {
        expected: expected.len(),
        ..LocalizeSummary::default()
    };

    let mut folders: Vec<ScanFolder> = Vec::new();
    let mut seen: FxHashSet<(String, String)> = FxHashSet::default();
    let mut matched_reports: FxHashSet<&str> = FxHashSet::default();

    // Primary join on the normalized report-number accession.
    let mut unmatched_rows: Vec<&InclusionRow> = Vec::new();
    for row in inclusion {
        match by_accession.get(row.accession_normalized.as_str()) {
            Some(matches) => {
                matched_reports.insert(row.report_num.as_str());
                push_matches(row, matches, MatchKey::Accession, &mut folders, &mut seen);
            }
            None => unmatched_rows.push(row),
        }
    }
    summary.matched_primary = matched_reports.len();

    // Fallback join on the normalized archive accession.
    for row in unmatched_rows {
        let Some(vna) = row.vna_accession.as_deref() else {
            continue;
        };
        let vna_normalized = normalize(vna);
        if let Some(matches) = by_accession.get(vna_normalized.as_str()) {
            matched_reports.insert(row.report_num.as_str());
            summary.matched_fallback += 1;
            push_matches(row, matches, MatchKey::VnaAccession, &mut folders, &mut seen);
        }
    }

    summary.unmatched = expected
        .iter()
        .filter(|report| !matched_reports.contains(**report))
        .map(|report| (*report).to_string())
        .collect();
    summary.unmatched.sort();

    verify_folder_mapping(&folders);

    info!(
        "Localized scans: {} expected, {} matched on accession, {} on archive accession, {} unmatched",
        summary.expected,
        summary.matched_primary,
        summary.matched_fallback,
        summary.unmatched.len()
    );
    if !summary.fully_resolved() {
        warn!(
            "Missing folders were identified for review: {:?}",
            summary.unmatched
        );
    }
    if folders.is_empty() && !inclusion.is_empty() {
        return Err(anyhow::anyhow!(
            "No included scan matched any manifest; check the accession normalization inputs"
        )
        .into());
    }

    Ok((folders, summary))
}

fn push_matches(
    row: &InclusionRow,
    matches: &[&ManifestRow],
    matched_on: MatchKey,
    folders: &mut Vec<ScanFolder>,
    seen: &mut FxHashSet<(String, String)>,
) {
    for manifest in matches {
        let key = (row.report_num.clone(), manifest.file_path.clone());
        if !seen.insert(key) {
            continue;
        }
        folders.push(ScanFolder {
            unique_study_id: row.unique_study_id.clone(),
            report_num: row.report_num.clone(),
            patient_id: manifest.patient_id.clone(),
            folder: manifest.folder.trim().to_string(),
            file_path: manifest.file_path.clone(),
            batch: manifest.batch.clone(),
            matched_on,
            study_datetime: row.study_datetime,
            flag_post_trauma_hem: row.flag_post_trauma_hem,
        });
    }
}

/// Warn when one folder resolves to more than one study
fn verify_folder_mapping(folders: &[ScanFolder]) {
    let mut by_folder: FxHashMap<&str, FxHashSet<&str>> = FxHashMap::default();
    for folder in folders {
        by_folder
            .entry(folder.file_path.as_str())
            .or_default()
            .insert(folder.unique_study_id.as_str());
    }
    for (file_path, studies) in &by_folder {
        if studies.len() > 1 {
            warn!(
                "Folder {} resolves to {} different studies",
                file_path,
                studies.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inclusion_row(usid: &str, report: &str, vna: Option<&str>) -> InclusionRow {
        InclusionRow {
            unique_study_id: usid.to_string(),
            accession_normalized: normalize(report),
            report_num: report.to_string(),
            search_accession: String::new(),
            vna_accession: vna.map(str::to_string),
            edw_accession: String::new(),
            study_id: None,
            study_datetime: None,
            flag_post_trauma_hem: None,
        }
    }

    fn manifest_row(accession: &str, folder: &str) -> ManifestRow {
        ManifestRow {
            patient_id: "P1".to_string(),
            accession_normalized: normalize(accession),
            accession: accession.to_string(),
            folder: folder.to_string(),
            file_path: format!("/images/{folder}"),
            batch: "batch1".to_string(),
        }
    }

    #[test]
    fn primary_then_fallback_join() {
        let inclusion = vec![
            inclusion_row("1", "CT2021R100", None),
            // Report number does not appear in the manifests, but the
            // archive accession does.
            inclusion_row("2", "CT2021R200", Some("*CT2021V200")),
            inclusion_row("3", "CT2021R300", None),
        ];
        let manifests = vec![
            manifest_row("*NWMCT2021R100", "F100"),
            manifest_row("CT2021V200", "F200"),
        ];

        let (folders, summary) = localize(&inclusion, &manifests).unwrap();
        assert_eq!(summary.expected, 3);
        assert_eq!(summary.matched_primary, 1);
        assert_eq!(summary.matched_fallback, 1);
        assert_eq!(summary.unmatched, vec!["CT2021R300".to_string()]);
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].matched_on, MatchKey::Accession);
        assert_eq!(folders[1].matched_on, MatchKey::VnaAccession);
    }

    #[test]
    fn duplicate_manifest_rows_resolve_once() {
        let inclusion = vec![inclusion_row("1", "CT2021R100", None)];
        let manifests = vec![
            manifest_row("*NWMCT2021R100", "F100"),
            manifest_row("NWMCT2021R100", "F100"),
        ];

        let (folders, summary) = localize(&inclusion, &manifests).unwrap();
        assert_eq!(folders.len(), 1);
        assert!(summary.fully_resolved());
    }
}
