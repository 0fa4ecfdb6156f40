//! Cohort inclusion
//!
//! Applies the manual-review decisions and the numeric inclusion rules to
//! the deduplicated scan volumes, producing the modeling-ready cohort:
//! the 72-hour follow-up window, the first-scan baseline volume threshold,
//! chart-review censoring, recomputed deltas, and the hemorrhage-expansion
//! outcome flags.

use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::algorithm::volumes::recompute_deltas;
use crate::error::Result;
use crate::models::{CohortRecord, CompartmentVolumes, ReviewAnnotations, ScanVolumeRecord, StudyRecord};
use crate::registry::review::{ChartReview, PatientReview, ScanExclusion};

/// Configuration for cohort inclusion
#[derive(Debug, Clone)]
pub struct InclusionConfig<'a> {
    pub patient_reviews: &'a [PatientReview],
    pub scan_exclusions: &'a [ScanExclusion],
    pub chart_reviews: &'a [ChartReview],
    /// Follow-up window relative to each patient's first scan, in hours
    pub follow_up_window_hours: i64,
    /// Minimum first-scan IPH or EAH volume for inclusion, in mL
    pub baseline_volume_ml: f64,
    /// Volume-increase thresholds for the outcome flags, in mL
    pub outcome_thresholds_ml: &'a [f64],
}

/// Row counts of the inclusion pass
#[derive(Debug, Clone, Default)]
pub struct InclusionSummary {
    pub scans_in: usize,
    /// Scans with no matching reconciled report
    pub missing_report: usize,
    /// Patients dropped by the review sheet's exclude flag
    pub excluded_patients: usize,
    /// Scans dropped by the scans-to-exclude sheet
    pub excluded_scans: usize,
    /// Scans outside the follow-up window
    pub outside_window: usize,
    /// Patients whose first scan is below the baseline volume threshold
    pub below_baseline_patients: usize,
    /// Patients with no qualifying chart-review row
    pub unreviewed_patients: usize,
    /// Censored post-surgical patients kept with null outcomes
    pub censored_patients: usize,
    pub patients_out: usize,
    pub scans_out: usize,
}

/// The finalized cohort: every scan, and one row per patient
#[derive(Debug, Clone)]
pub struct CohortTables {
    pub all_scans: Vec<CohortRecord>,
    /// The first remaining scan of each patient
    pub first_scans: Vec<CohortRecord>,
}

/// Build the modeling-ready cohort from deduplicated scan volumes
pub fn build_cohort(
    scans: Vec<ScanVolumeRecord>,
    studies: &[StudyRecord],
    config: &InclusionConfig<'_>,
) -> Result<(CohortTables, InclusionSummary)> {
    let mut summary = InclusionSummary {
        scans_in: scans.len(),
        ..InclusionSummary::default()
    };

    // Reconciled report keys; scans must trace back to an annotated report.
    let report_keys: FxHashSet<(&str, &str)> = studies
        .iter()
        .map(|s| (s.unique_study_id.as_str(), s.report_num.as_str()))
        .collect();
    let (mut scans, dropped): (Vec<_>, Vec<_>) = scans.into_iter().partition(|s| {
        report_keys.contains(&(s.unique_study_id.as_str(), s.report_num.as_str()))
    });
    summary.missing_report = dropped.len();

    // Patient-level exclude flags from the review sheet.
    let reviews_by_patient: FxHashMap<&str, &PatientReview> = config
        .patient_reviews
        .iter()
        .map(|r| (r.unique_study_id.as_str(), r))
        .collect();
    let excluded_patients: FxHashSet<&str> = reviews_by_patient
        .iter()
        .filter(|(_, review)| review.exclude == Some(true))
        .map(|(patient, _)| *patient)
        .collect();
    summary.excluded_patients = excluded_patients.len();
    scans.retain(|s| !excluded_patients.contains(s.unique_study_id.as_str()));

    // Scan-level exclusions from image review.
    let excluded_scan_ids: FxHashSet<&str> = config
        .scan_exclusions
        .iter()
        .map(|e| e.scan_id.as_str())
        .collect();
    let before = scans.len();
    scans.retain(|s| !excluded_scan_ids.contains(s.scan_id.as_str()));
    summary.excluded_scans = before - scans.len();

    // Keep scans within the follow-up window of each patient's first scan.
    scans.sort_by(|a, b| {
        (a.unique_study_id.as_str(), a.study_datetime)
            .cmp(&(b.unique_study_id.as_str(), b.study_datetime))
    });
    let first_scan_times: FxHashMap<String, chrono::NaiveDateTime> = {
        let mut firsts = FxHashMap::default();
        for scan in &scans {
            firsts
                .entry(scan.unique_study_id.clone())
                .or_insert(scan.study_datetime);
        }
        firsts
    };
    let mut hours_since_first: FxHashMap<(String, String), f64> = FxHashMap::default();
    let window = config.follow_up_window_hours as f64;
    let before = scans.len();
    scans.retain(|scan| {
        let Some(first) = first_scan_times.get(&scan.unique_study_id) else {
            return false;
        };
        let minutes = (scan.study_datetime - *first).num_minutes();
        let hours = (minutes as f64 / 60.0).round();
        hours_since_first.insert(
            (scan.unique_study_id.clone(), scan.report_num.clone()),
            hours,
        );
        hours <= window
    });
    summary.outside_window = before - scans.len();

    // Baseline volume threshold on the first remaining scan.
    let mut first_volumes: FxHashMap<&str, &CompartmentVolumes> = FxHashMap::default();
    for scan in &scans {
        first_volumes
            .entry(scan.unique_study_id.as_str())
            .or_insert(&scan.volumes);
    }
    let qualifying: FxHashSet<String> = first_volumes
        .iter()
        .filter(|(_, volumes)| {
            volumes.iph >= config.baseline_volume_ml || volumes.eah >= config.baseline_volume_ml
        })
        .map(|(patient, _)| (*patient).to_string())
        .collect();
    summary.below_baseline_patients = first_volumes.len() - qualifying.len();
    scans.retain(|s| qualifying.contains(&s.unique_study_id));

    // Chart review: keep included patients plus censored post-surgical
    // patients. Patients never chart-reviewed drop out.
    let chart_by_patient: FxHashMap<&str, &ChartReview> = config
        .chart_reviews
        .iter()
        .map(|r| (r.unique_study_id.as_str(), r))
        .collect();
    let (scans, dropped): (Vec<_>, Vec<_>) = scans.into_iter().partition(|s| {
        match chart_by_patient.get(s.unique_study_id.as_str()) {
            Some(review) => {
                review.exclude == Some(false) || review.annotations.second_scan_post_surgery
            }
            None => false,
        }
    });
    let unreviewed: FxHashSet<&str> = dropped
        .iter()
        .map(|scan| scan.unique_study_id.as_str())
        .collect();
    summary.unreviewed_patients = unreviewed.len();

    // Exclusions may have removed a patient's original first scan; the
    // first remaining scan becomes the new baseline.
    let mut scans = scans;
    recompute_deltas(&mut scans);

    for scan in &scans {
        if scan.scan_number == 1 {
            continue;
        }
        if first_scan_times
            .get(&scan.unique_study_id)
            .is_some_and(|first| scan.study_datetime == *first)
        {
            warn!(
                "Patient {} starts at session {}",
                scan.unique_study_id, scan.scan_number
            );
        }
    }

    // Per-patient maximum change from the first scan.
    let mut max_changes: FxHashMap<&str, CompartmentVolumes> = FxHashMap::default();
    for scan in &scans {
        let entry = max_changes
            .entry(scan.unique_study_id.as_str())
            .or_insert(scan.change_from_first);
        *entry = entry.max_with(&scan.change_from_first);
    }

    // Assemble cohort records with annotations and outcome flags.
    let mut all_scans: Vec<CohortRecord> = Vec::with_capacity(scans.len());
    let mut censored: FxHashSet<&str> = FxHashSet::default();
    for scan in &scans {
        let annotations = chart_by_patient
            .get(scan.unique_study_id.as_str())
            .map(|review| review.annotations.clone())
            .unwrap_or_default();
        let max_change = max_changes
            .get(scan.unique_study_id.as_str())
            .copied()
            .unwrap_or_default();

        if annotations.second_scan_post_surgery {
            censored.insert(scan.unique_study_id.as_str());
        }

        let outcomes: Vec<Option<bool>> = config
            .outcome_thresholds_ml
            .iter()
            .map(|threshold| {
                if annotations.second_scan_post_surgery {
                    // Post-surgical volume changes do not reflect natural
                    // expansion.
                    None
                } else {
                    Some(max_change.iph >= *threshold || max_change.eah >= *threshold)
                }
            })
            .collect();

        let time_since_first_scan_hours = hours_since_first
            .get(&(scan.unique_study_id.clone(), scan.report_num.clone()))
            .copied()
            .unwrap_or(0.0);

        all_scans.push(CohortRecord {
            scan: scan.clone(),
            time_since_first_scan_hours,
            review: annotations,
            max_change_from_first: max_change,
            outcomes,
        });
    }

    summary.censored_patients = censored.len();
    summary.scans_out = all_scans.len();
    summary.patients_out = all_scans
        .iter()
        .map(|r| r.scan.unique_study_id.as_str())
        .collect::<FxHashSet<_>>()
        .len();

    // One row per patient: the first remaining scan.
    let mut first_scans: Vec<CohortRecord> = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    for record in &all_scans {
        if seen.insert(record.scan.unique_study_id.clone()) {
            first_scans.push(record.clone());
        }
    }

    info!(
        "Cohort inclusion: {} scans in -> {} scans across {} patients ({} censored post-surgical); \
         dropped {} without report, {} excluded patients, {} excluded scans, {} outside {}h window, \
         {} below {} mL baseline, {} unreviewed",
        summary.scans_in,
        summary.scans_out,
        summary.patients_out,
        summary.censored_patients,
        summary.missing_report,
        summary.excluded_patients,
        summary.excluded_scans,
        summary.outside_window,
        config.follow_up_window_hours,
        summary.below_baseline_patients,
        config.baseline_volume_ml,
        summary.unreviewed_patients
    );

    Ok((
        CohortTables {
            all_scans,
            first_scans,
        },
        summary,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn dt(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn scan(
        usid: &str,
        scan_number: u32,
        datetime: NaiveDateTime,
        iph: f64,
    ) -> ScanVolumeRecord {
        let volumes = CompartmentVolumes {
            iph,
            ..CompartmentVolumes::default()
        };
        ScanVolumeRecord {
            unique_study_id: usid.to_string(),
            report_num: format!("CT{usid}_{scan_number}"),
            scan_id: format!("scan_{usid}_{scan_number}"),
            scan_number,
            study_datetime: datetime,
            flag_post_trauma_hem: None,
            folder: format!("F{scan_number}"),
            image_name: "head".to_string(),
            image: String::new(),
            prediction: String::new(),
            slice_count: 40,
            volumes,
            quality_control_metric: 1.0,
            total_volume_ml: volumes.hemorrhage_total(),
            first_scan_volumes: CompartmentVolumes::default(),
            first_scan_total_ml: 0.0,
            change_from_first: CompartmentVolumes::default(),
            change_total_ml: 0.0,
        }
    }

    fn study(usid: &str, scan_number: u32) -> StudyRecord {
        StudyRecord {
            unique_study_id: usid.to_string(),
            report_num: format!("CT{usid}_{scan_number}"),
            search_accession: String::new(),
            vna_accession: None,
            edw_accession: String::new(),
            study_id: None,
            study_description: None,
            study_datetime: None,
            suids: None,
            accession_normalized: String::new(),
            order_reason: None,
            report: Some("report text".to_string()),
            keyword_flags: crate::models::KeywordFlags::default(),
        }
    }

    fn chart(usid: &str, exclude: bool, post_surgery: bool) -> ChartReview {
        ChartReview {
            unique_study_id: usid.to_string(),
            exclude: Some(exclude),
            annotations: ReviewAnnotations {
                second_scan_post_surgery: post_surgery,
                ..ReviewAnnotations::default()
            },
        }
    }

    fn base_config<'a>(charts: &'a [ChartReview]) -> InclusionConfig<'a> {
        InclusionConfig {
            patient_reviews: &[],
            scan_exclusions: &[],
            chart_reviews: charts,
            follow_up_window_hours: 72,
            baseline_volume_ml: 2.0,
            outcome_thresholds_ml: &[6.0, 8.0, 10.0],
        }
    }

    #[test]
    fn window_keeps_72h_and_drops_73h() {
        let charts = vec![chart("1", false, false)];
        let scans = vec![
            scan("1", 1, dt(10, 0), 3.0),
            scan("1", 2, dt(13, 0), 5.0),  // exactly 72h
            scan("1", 3, dt(13, 1), 12.0), // 73h after rounding
        ];
        let studies = vec![study("1", 1), study("1", 2), study("1", 3)];
        let (tables, summary) = build_cohort(scans, &studies, &base_config(&charts)).unwrap();
        assert_eq!(summary.outside_window, 1);
        assert_eq!(tables.all_scans.len(), 2);
        assert_eq!(tables.all_scans[1].time_since_first_scan_hours, 72.0);
    }

    #[test]
    fn outcomes_flag_expansion_and_censoring() {
        let charts = vec![chart("1", false, false), chart("2", false, true)];
        let scans = vec![
            scan("1", 1, dt(10, 0), 3.0),
            scan("1", 2, dt(11, 0), 12.0), // +9 mL
            scan("2", 1, dt(10, 0), 4.0),
            scan("2", 2, dt(11, 0), 30.0),
        ];
        let studies = vec![
            study("1", 1),
            study("1", 2),
            study("2", 1),
            study("2", 2),
        ];
        let (tables, summary) = build_cohort(scans, &studies, &base_config(&charts)).unwrap();
        assert_eq!(summary.censored_patients, 1);

        let patient1: Vec<_> = tables
            .all_scans
            .iter()
            .filter(|r| r.scan.unique_study_id == "1")
            .collect();
        // Thresholds 6/8/10: +9 mL sets the first two, not the third.
        assert_eq!(patient1[0].outcomes, vec![Some(true), Some(true), Some(false)]);

        let patient2: Vec<_> = tables
            .all_scans
            .iter()
            .filter(|r| r.scan.unique_study_id == "2")
            .collect();
        // Censored post-surgical patients carry null outcomes.
        assert_eq!(patient2[0].outcomes, vec![None, None, None]);
    }

    #[test]
    fn baseline_threshold_drops_low_volume_patients() {
        let charts = vec![chart("1", false, false), chart("2", false, false)];
        let scans = vec![
            scan("1", 1, dt(10, 0), 3.0),
            scan("1", 2, dt(11, 0), 4.0),
            scan("2", 1, dt(10, 0), 0.5),
            scan("2", 2, dt(11, 0), 20.0),
        ];
        let studies = vec![
            study("1", 1),
            study("1", 2),
            study("2", 1),
            study("2", 2),
        ];
        let (tables, summary) = build_cohort(scans, &studies, &base_config(&charts)).unwrap();
        assert_eq!(summary.below_baseline_patients, 1);
        assert!(tables
            .all_scans
            .iter()
            .all(|r| r.scan.unique_study_id == "1"));
    }

    #[test]
    fn excluded_first_scan_moves_the_baseline() {
        let charts = vec![chart("1", false, false)];
        let scans = vec![
            scan("1", 1, dt(10, 0), 5.0),
            scan("1", 2, dt(11, 0), 6.0),
            scan("1", 3, dt(12, 0), 10.0),
        ];
        let studies = vec![study("1", 1), study("1", 2), study("1", 3)];
        let exclusions = vec![ScanExclusion {
            unique_study_id: Some("1".to_string()),
            scan_id: "scan_1_1".to_string(),
        }];
        let mut config = base_config(&charts);
        config.scan_exclusions = &exclusions;

        let (tables, summary) = build_cohort(scans, &studies, &config).unwrap();
        assert_eq!(summary.excluded_scans, 1);
        // The second scan is the new baseline: deltas are 0 and +4.
        assert_eq!(tables.all_scans[0].scan.change_from_first.iph, 0.0);
        assert_eq!(tables.all_scans[1].scan.change_from_first.iph, 4.0);
        assert_eq!(tables.first_scans.len(), 1);
        assert_eq!(tables.first_scans[0].scan.scan_number, 2);
    }
}
