//! End-to-end test of the algorithm chain on a small synthetic cohort:
//! reconciliation through the train/test split, without touching disk.

use chrono::{NaiveDate, NaiveDateTime};
use rustc_hash::FxHashSet;

use tbi_cohort::accession::normalize;
use tbi_cohort::algorithm::aggregate::{assign_scan_numbers, PreparedPrediction};
use tbi_cohort::algorithm::dedup::{dedup_sessions, DedupConfig};
use tbi_cohort::algorithm::inclusion::{build_cohort, InclusionConfig};
use tbi_cohort::algorithm::localize::localize;
use tbi_cohort::algorithm::reconcile::reconcile;
use tbi_cohort::algorithm::split::split_indices;
use tbi_cohort::algorithm::volumes::compute_volume_deltas;
use tbi_cohort::models::{CompartmentVolumes, InclusionRow, KeywordFlags, ManifestRow};
use tbi_cohort::registry::identifiers::IdentifierRow;
use tbi_cohort::registry::image_index::ImageIndexRow;
use tbi_cohort::registry::rad_reports::RadReportRow;
use tbi_cohort::registry::review::ChartReview;
use tbi_cohort::models::ReviewAnnotations;

fn dt(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 3, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn index_row(n: u32, day: u32) -> ImageIndexRow {
    let search = format!("*CT2021R{n:03}");
    ImageIndexRow {
        accession_stripped: tbi_cohort::accession::strip_modality_markers(&search),
        search_accession: search,
        vna_accession: Some(format!("CT2021V{n:03}")),
        edw_accession: format!("NWMHCT2021R{n:03}"),
        study_id: None,
        study_description: Some("CT HEAD WO CONTRAST".to_string()),
        suids: None,
        study_datetime: Some(dt(day, 9)),
    }
}

fn report_row(n: u32) -> RadReportRow {
    let accession = format!("NWMHCT2021R{n:03}");
    RadReportRow {
        accession_stripped: tbi_cohort::accession::strip_modality_markers(&accession),
        accession,
        order_reason: Some("trauma".to_string()),
        report: Some("acute hemorrhage identified".to_string()),
        keyword_flags: KeywordFlags {
            trauma: true,
            ..KeywordFlags::default()
        },
    }
}

fn identifier_row(usid: &str, n: u32) -> IdentifierRow {
    IdentifierRow {
        unique_study_id: usid.to_string(),
        search_accession: format!("*CT2021R{n:03}"),
        vna_accession: Some(format!("CT2021V{n:03}")),
        edw_accession: format!("NWMHCT2021R{n:03}"),
    }
}

fn manifest_row(n: u32, folder: &str) -> ManifestRow {
    let accession = format!("*NWMCT2021R{n:03}");
    ManifestRow {
        patient_id: format!("P{n:03}"),
        accession_normalized: normalize(&accession),
        accession,
        folder: folder.to_string(),
        file_path: format!("/share/images/{folder}"),
        batch: "batch1".to_string(),
    }
}

fn chart(usid: &str, post_surgery: bool) -> ChartReview {
    ChartReview {
        unique_study_id: usid.to_string(),
        exclude: Some(false),
        annotations: ReviewAnnotations {
            second_scan_post_surgery: post_surgery,
            ..ReviewAnnotations::default()
        },
    }
}

#[test]
fn synthetic_cohort_flows_to_outcomes() {
    // Two patients, two scans each. Patient 1 expands by 9 mL; patient 2
    // shrinks and is censored post-surgical.
    let image_index = vec![
        index_row(1, 10),
        index_row(2, 11),
        index_row(3, 10),
        index_row(4, 12),
    ];
    let reports = vec![report_row(1), report_row(2), report_row(3), report_row(4)];
    let identifiers = vec![
        identifier_row("1", 1),
        identifier_row("1", 2),
        identifier_row("2", 3),
        identifier_row("2", 4),
    ];

    let (studies, summary) = reconcile(&image_index, &reports, &identifiers).unwrap();
    assert_eq!(summary.identified_rows, 4);
    assert_eq!(studies.len(), 4);

    // Localization: inclusion list derived from the reconciled studies.
    let inclusion_rows: Vec<InclusionRow> = studies
        .iter()
        .map(|s| InclusionRow {
            unique_study_id: s.unique_study_id.clone(),
            accession_normalized: normalize(&s.report_num),
            report_num: s.report_num.clone(),
            search_accession: s.search_accession.clone(),
            vna_accession: s.vna_accession.clone(),
            edw_accession: s.edw_accession.clone(),
            study_id: None,
            study_datetime: s.study_datetime,
            flag_post_trauma_hem: Some(true),
        })
        .collect();
    let manifests = vec![
        manifest_row(1, "F001"),
        manifest_row(2, "F002"),
        manifest_row(3, "F003"),
        manifest_row(4, "F004"),
    ];
    let (folders, localize_summary) = localize(&inclusion_rows, &manifests).unwrap();
    assert!(localize_summary.fully_resolved());
    assert_eq!(folders.len(), 4);

    // Predictions: one series per scan folder.
    let volumes = [3.0, 12.0, 20.0, 5.0];
    let mut prepared: Vec<PreparedPrediction> = folders
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(idx, (folder, iph))| PreparedPrediction {
            scan_id: format!("scan_{}", idx + 1),
            image: format!("nifti_images/{}/random/head_h41/img.nii", folder.folder),
            prediction: String::new(),
            volumes: CompartmentVolumes {
                iph,
                ..CompartmentVolumes::default()
            },
            quality_metric: 1.0,
            unique_study_id: folder.unique_study_id.clone(),
            report_num: folder.report_num.clone(),
            folder: folder.folder.clone(),
            image_name: "head_h41".to_string(),
            study_datetime: folder.study_datetime.unwrap(),
            flag_post_trauma_hem: folder.flag_post_trauma_hem,
            scan_number: 0,
            slice_count: 42,
        })
        .collect();
    assign_scan_numbers(&mut prepared);

    let dedup_config = DedupConfig {
        problem_scan_ids: &[],
        min_slices: 30,
        max_slices: 100,
        overrides: &[],
    };
    let (deduplicated, dedup_summary) = dedup_sessions(prepared, &dedup_config).unwrap();
    assert_eq!(dedup_summary.patients_out, 2);
    assert_eq!(deduplicated.len(), 4);

    let scan_volumes = compute_volume_deltas(deduplicated);
    assert_eq!(scan_volumes.len(), 4);

    let charts = vec![chart("1", false), chart("2", true)];
    let inclusion_config = InclusionConfig {
        patient_reviews: &[],
        scan_exclusions: &[],
        chart_reviews: &charts,
        follow_up_window_hours: 72,
        baseline_volume_ml: 2.0,
        outcome_thresholds_ml: &[6.0, 8.0, 10.0],
    };
    let (cohort, inclusion_summary) =
        build_cohort(scan_volumes, &studies, &inclusion_config).unwrap();
    assert_eq!(inclusion_summary.patients_out, 2);
    assert_eq!(inclusion_summary.censored_patients, 1);
    assert_eq!(cohort.first_scans.len(), 2);

    let patient1 = cohort
        .first_scans
        .iter()
        .find(|r| r.scan.unique_study_id == "1")
        .unwrap();
    assert_eq!(patient1.max_change_from_first.iph, 9.0);
    assert_eq!(patient1.outcomes, vec![Some(true), Some(true), Some(false)]);

    let patient2 = cohort
        .first_scans
        .iter()
        .find(|r| r.scan.unique_study_id == "2")
        .unwrap();
    assert_eq!(patient2.outcomes, vec![None, None, None]);
}

#[test]
fn split_keeps_patients_disjoint() {
    let (train, test) = split_indices(100, 0.3, 1300);
    assert_eq!(train.len(), 70);
    assert_eq!(test.len(), 30);
    let train_set: FxHashSet<usize> = train.into_iter().collect();
    assert!(test.iter().all(|idx| !train_set.contains(idx)));
}
