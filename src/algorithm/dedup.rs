//! Per-session series deduplication
//!
//! A single imaging session often produced several candidate series:
//! repeats after patient motion, tilt/equalization-corrected
//! reconstructions, bone-algorithm duplicates. This stage reduces the
//! prepared predictions to one record per (patient, session), preferring
//! corrected series and breaking remaining ties by the segmentation
//! quality metric, with a manually-reviewed override table having the
//! final word.

use itertools::Itertools;
use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::algorithm::aggregate::PreparedPrediction;
use crate::error::Result;
use crate::registry::review::ImageOverride;

/// Image-path keywords that disqualify a series outright. Bone-algorithm
/// and petrous reconstructions are not brain-tissue series; `h60s`
/// kernels are blurry and always have a sharper `h41` counterpart.
pub const EXCLUDED_IMAGE_KEYWORDS: &[&str] = &["bone", "petro", "h60s"];

/// Image-path markers of tilt/equalization-corrected series
pub const CORRECTED_IMAGE_MARKERS: &[&str] = &["tilt", "_eq"];

/// Configuration for the deduplication pass
#[derive(Debug, Clone)]
pub struct DedupConfig<'a> {
    /// Scan ids removed after manual inspection of the source data
    pub problem_scan_ids: &'a [String],
    /// Minimum usable slice count (inclusive)
    pub min_slices: u32,
    /// Slice count at or above which a series is discarded
    pub max_slices: u32,
    /// Manually-reviewed session overrides
    pub overrides: &'a [ImageOverride],
}

/// Row counts of the deduplication pass
#[derive(Debug, Clone, Default)]
pub struct DedupSummary {
    pub rows_in: usize,
    pub dropped_problem_ids: usize,
    pub dropped_keywords: usize,
    pub dropped_slice_count: usize,
    pub dropped_single_scan_patients: usize,
    pub rows_out: usize,
    pub patients_out: usize,
}

/// Reduce prepared predictions to one record per imaging session
pub fn dedup_sessions(
    records: Vec<PreparedPrediction>,
    config: &DedupConfig<'_>,
) -> Result<(Vec<PreparedPrediction>, DedupSummary)> {
    let mut summary = DedupSummary {
        rows_in: records.len(),
        ..DedupSummary::default()
    };

    // Known-bad scans go first, before any grouping can pick them.
    let problem_ids: FxHashSet<&str> = config.problem_scan_ids.iter().map(String::as_str).collect();
    let (records, dropped): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|r| !problem_ids.contains(r.scan_id.as_str()));
    summary.dropped_problem_ids = dropped.len();

    // Disqualifying path keywords.
    let (records, dropped): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| {
        let image = r.image.to_lowercase();
        !EXCLUDED_IMAGE_KEYWORDS
            .iter()
            .any(|keyword| image.contains(keyword))
    });
    summary.dropped_keywords = dropped.len();

    // Slice-count window, then per-group maximum.
    let (records, dropped): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|r| r.slice_count >= config.min_slices && r.slice_count < config.max_slices);
    summary.dropped_slice_count = dropped.len();

    let mut group_max: FxHashMap<(String, u32, String), u32> = FxHashMap::default();
    for record in &records {
        let key = (
            record.unique_study_id.clone(),
            record.scan_number,
            record.image_name.clone(),
        );
        let entry = group_max.entry(key).or_insert(0);
        *entry = (*entry).max(record.slice_count);
    }
    let records: Vec<_> = records
        .into_iter()
        .filter(|r| {
            group_max
                .get(&(
                    r.unique_study_id.clone(),
                    r.scan_number,
                    r.image_name.clone(),
                ))
                .is_some_and(|max| *max >= config.min_slices)
        })
        .collect();

    // Partition into corrected and uncorrected series.
    let (corrected, uncorrected): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| {
        let image = r.image.to_lowercase();
        CORRECTED_IMAGE_MARKERS
            .iter()
            .any(|marker| image.contains(marker))
    });

    // Within each partition, one record per (patient, image name, session).
    let corrected = keep_min_quality(corrected, |r| {
        (
            r.unique_study_id.clone(),
            r.image_name.clone(),
            r.scan_number,
        )
    });
    let uncorrected = keep_min_quality(uncorrected, |r| {
        (
            r.unique_study_id.clone(),
            r.image_name.clone(),
            r.scan_number,
        )
    });

    // Prefer the corrected partition where both exist.
    let corrected_keys: FxHashSet<(String, String, u32, String, String)> = corrected
        .iter()
        .map(|r| {
            (
                r.unique_study_id.clone(),
                r.report_num.clone(),
                r.scan_number,
                r.folder.clone(),
                r.image_name.clone(),
            )
        })
        .collect();
    let uncorrected: Vec<_> = uncorrected
        .into_iter()
        .filter(|r| {
            !corrected_keys.contains(&(
                r.unique_study_id.clone(),
                r.report_num.clone(),
                r.scan_number,
                r.folder.clone(),
                r.image_name.clone(),
            ))
        })
        .collect();

    let combined: Vec<_> = corrected.into_iter().chain(uncorrected).collect();

    // Sessions still holding several records go to the override table.
    let resolved = resolve_ambiguous_sessions(combined, config.overrides);

    // One patient carries two report numbers for the same physical scan;
    // after the stable sort the first record per (patient, folder) wins.
    let mut resolved = resolved;
    resolved.sort_by(|a, b| {
        (a.unique_study_id.as_str(), a.scan_number)
            .cmp(&(b.unique_study_id.as_str(), b.scan_number))
    });
    let mut seen_folders: FxHashSet<(String, String)> = FxHashSet::default();
    let resolved: Vec<_> = resolved
        .into_iter()
        .filter(|r| seen_folders.insert((r.unique_study_id.clone(), r.folder.clone())))
        .collect();

    // A longitudinal cohort needs at least two scans per patient.
    let mut scans_per_patient: FxHashMap<&str, usize> = FxHashMap::default();
    for record in &resolved {
        *scans_per_patient
            .entry(record.unique_study_id.as_str())
            .or_insert(0) += 1;
    }
    let single_scan: FxHashSet<String> = scans_per_patient
        .iter()
        .filter(|(_, count)| **count < 2)
        .map(|(patient, _)| (*patient).to_string())
        .collect();
    summary.dropped_single_scan_patients = single_scan.len();

    let resolved: Vec<_> = resolved
        .into_iter()
        .filter(|r| !single_scan.contains(&r.unique_study_id))
        .collect();

    verify_unique_sessions(&resolved);

    summary.rows_out = resolved.len();
    summary.patients_out = resolved
        .iter()
        .map(|r| r.unique_study_id.as_str())
        .collect::<FxHashSet<_>>()
        .len();

    info!(
        "Deduplicated sessions: {} rows in, {} out across {} patients ({} problem ids, {} keyword, {} slice-count, {} single-scan patients dropped)",
        summary.rows_in,
        summary.rows_out,
        summary.patients_out,
        summary.dropped_problem_ids,
        summary.dropped_keywords,
        summary.dropped_slice_count,
        summary.dropped_single_scan_patients
    );

    Ok((resolved, summary))
}

/// Keep the minimum-quality-metric record per key; groups of one pass
/// through unchanged. Ties keep the first record in input order.
fn keep_min_quality<K, F>(records: Vec<PreparedPrediction>, key: F) -> Vec<PreparedPrediction>
where
    K: std::hash::Hash + Eq,
    F: Fn(&PreparedPrediction) -> K,
{
    let groups = records.into_iter().map(|r| (key(&r), r)).into_group_map();
    let mut kept: Vec<PreparedPrediction> = Vec::with_capacity(groups.len());
    for (_, group) in groups {
        let best = group.into_iter().reduce(|best, candidate| {
            if candidate.quality_metric < best.quality_metric {
                candidate
            } else {
                best
            }
        });
        if let Some(best) = best {
            kept.push(best);
        }
    }
    // Group maps do not preserve order; restore a stable one.
    kept.sort_by(|a, b| {
        (
            a.unique_study_id.as_str(),
            a.scan_number,
            a.image_name.as_str(),
            a.scan_id.as_str(),
        )
            .cmp(&(
                b.unique_study_id.as_str(),
                b.scan_number,
                b.image_name.as_str(),
                b.scan_id.as_str(),
            ))
    });
    kept
}

/// Resolve (patient, folder, session) groups that still hold several
/// records: the override table picks the reviewed image; everything else
/// falls back to the minimum quality metric per (patient, report).
fn resolve_ambiguous_sessions(
    records: Vec<PreparedPrediction>,
    overrides: &[ImageOverride],
) -> Vec<PreparedPrediction> {
    let mut group_counts: FxHashMap<(String, String, u32), usize> = FxHashMap::default();
    for record in &records {
        *group_counts
            .entry((
                record.unique_study_id.clone(),
                record.folder.clone(),
                record.scan_number,
            ))
            .or_insert(0) += 1;
    }

    let (ambiguous, unambiguous): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| {
        group_counts
            .get(&(r.unique_study_id.clone(), r.folder.clone(), r.scan_number))
            .is_some_and(|count| *count >= 2)
    });

    if ambiguous.is_empty() {
        return unambiguous;
    }
    info!(
        "{} records across ambiguous sessions; consulting override table",
        ambiguous.len()
    );

    let override_keys: FxHashSet<(&str, &str)> = overrides
        .iter()
        .map(|o| (o.unique_study_id.as_str(), o.scan_id.as_str()))
        .collect();

    let (reviewed, rest): (Vec<_>, Vec<_>) = ambiguous.into_iter().partition(|r| {
        override_keys.contains(&(r.unique_study_id.as_str(), r.scan_id.as_str()))
    });

    let reviewed_reports: FxHashSet<(String, String)> = reviewed
        .iter()
        .map(|r| (r.unique_study_id.clone(), r.report_num.clone()))
        .collect();
    let rest: Vec<_> = rest
        .into_iter()
        .filter(|r| !reviewed_reports.contains(&(r.unique_study_id.clone(), r.report_num.clone())))
        .collect();
    let rest = keep_min_quality(rest, |r| {
        (r.unique_study_id.clone(), r.report_num.clone())
    });

    unambiguous
        .into_iter()
        .chain(reviewed)
        .chain(rest)
        .collect()
}

/// Warn when a (patient, session) still holds more than one record
fn verify_unique_sessions(records: &[PreparedPrediction]) {
    let mut counts: FxHashMap<(&str, u32), usize> = FxHashMap::default();
    for record in records {
        *counts
            .entry((record.unique_study_id.as_str(), record.scan_number))
            .or_insert(0) += 1;
    }
    for ((patient, session), count) in &counts {
        if *count > 1 {
            warn!("Patient {patient} session {session} still holds {count} records");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompartmentVolumes;
    use chrono::NaiveDate;

    fn record(
        usid: &str,
        scan_id: &str,
        image: &str,
        folder: &str,
        scan_number: u32,
        quality: f64,
    ) -> PreparedPrediction {
        PreparedPrediction {
            scan_id: scan_id.to_string(),
            image: image.to_string(),
            prediction: String::new(),
            volumes: CompartmentVolumes::default(),
            quality_metric: quality,
            unique_study_id: usid.to_string(),
            report_num: format!("CT{usid}{scan_number}"),
            folder: folder.to_string(),
            image_name: crate::algorithm::aggregate::image_name_from_path(image)
                .unwrap_or_default(),
            study_datetime: NaiveDate::from_ymd_opt(2021, 3, 10)
                .unwrap()
                .and_hms_opt(scan_number, 0, 0)
                .unwrap(),
            flag_post_trauma_hem: None,
            scan_number,
            slice_count: 40,
        }
    }

    fn config<'a>(overrides: &'a [ImageOverride], problems: &'a [String]) -> DedupConfig<'a> {
        DedupConfig {
            problem_scan_ids: problems,
            min_slices: 30,
            max_slices: 100,
            overrides,
        }
    }

    #[test]
    fn corrected_series_wins_over_uncorrected() {
        let records = vec![
            record("1", "scan_1", "n/F1/random/head/i.nii", "F1", 1, 2.0),
            record("1", "scan_2", "n/F1/random/head/i_Tilt.nii", "F1", 1, 5.0),
            record("1", "scan_3", "n/F2/random/head/i.nii", "F2", 2, 1.0),
        ];
        let (kept, summary) = dedup_sessions(records, &config(&[], &[])).unwrap();
        assert_eq!(summary.rows_out, 2);
        // Session 1 keeps the tilt-corrected series despite its worse
        // quality metric.
        let session1: Vec<_> = kept.iter().filter(|r| r.scan_number == 1).collect();
        assert_eq!(session1.len(), 1);
        assert_eq!(session1[0].scan_id, "scan_2");
    }

    #[test]
    fn min_quality_breaks_repeat_acquisitions() {
        let records = vec![
            record("1", "scan_1", "n/F1/random/head/i.nii", "F1", 1, 3.0),
            record("1", "scan_2", "n/F1/random/head/i2.nii", "F1", 1, 1.5),
            record("1", "scan_3", "n/F2/random/head/i.nii", "F2", 2, 1.0),
        ];
        let (kept, _) = dedup_sessions(records, &config(&[], &[])).unwrap();
        let session1: Vec<_> = kept.iter().filter(|r| r.scan_number == 1).collect();
        assert_eq!(session1.len(), 1);
        assert_eq!(session1[0].scan_id, "scan_2");
    }

    #[test]
    fn at_most_one_record_per_session() {
        let records = vec![
            record("1", "scan_1", "n/F1/random/head_a/i.nii", "F1", 1, 3.0),
            record("1", "scan_2", "n/F1/random/head_b/i.nii", "F1", 1, 2.0),
            record("1", "scan_3", "n/F2/random/head/i.nii", "F2", 2, 1.0),
        ];
        let (kept, _) = dedup_sessions(records, &config(&[], &[])).unwrap();
        let mut counts: FxHashMap<(String, u32), usize> = FxHashMap::default();
        for record in &kept {
            *counts
                .entry((record.unique_study_id.clone(), record.scan_number))
                .or_insert(0) += 1;
        }
        assert!(counts.values().all(|count| *count == 1));
    }

    #[test]
    fn override_table_has_the_final_word() {
        let overrides = vec![ImageOverride {
            unique_study_id: "1".to_string(),
            scan_id: "scan_1".to_string(),
        }];
        let records = vec![
            record("1", "scan_1", "n/F1/random/head_a/i.nii", "F1", 1, 9.0),
            record("1", "scan_2", "n/F1/random/head_b/i.nii", "F1", 1, 0.5),
            record("1", "scan_3", "n/F2/random/head/i.nii", "F2", 2, 1.0),
        ];
        let (kept, _) = dedup_sessions(records, &config(&overrides, &[])).unwrap();
        let session1: Vec<_> = kept.iter().filter(|r| r.scan_number == 1).collect();
        assert_eq!(session1.len(), 1);
        // The reviewed image wins even with the worse quality metric.
        assert_eq!(session1[0].scan_id, "scan_1");
    }

    #[test]
    fn problem_ids_and_single_scan_patients_drop() {
        let problems = vec!["scan_9".to_string()];
        let records = vec![
            record("1", "scan_9", "n/F1/random/head/i.nii", "F1", 1, 1.0),
            record("1", "scan_2", "n/F2/random/head/i.nii", "F2", 2, 1.0),
        ];
        // After dropping the problem scan, patient 1 has one scan left and
        // falls out of the cohort entirely.
        let (kept, summary) = dedup_sessions(records, &config(&[], &problems)).unwrap();
        assert!(kept.is_empty());
        assert_eq!(summary.dropped_problem_ids, 1);
        assert_eq!(summary.dropped_single_scan_patients, 1);
    }
}
