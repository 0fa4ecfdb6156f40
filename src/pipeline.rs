//! Pipeline orchestration
//!
//! Runs the stage chain end to end against a configured data snapshot.
//! Every stage writes its artifact under the processed-data directory
//! before the next stage starts, so a run can be resumed (or a single
//! stage re-run) by inspecting files on disk.

use std::time::Instant;

use log::info;

use crate::algorithm::aggregate::{prepare_predictions, slice_count_index};
use crate::algorithm::dedup::{dedup_sessions, DedupConfig};
use crate::algorithm::inclusion::{build_cohort, CohortTables, InclusionConfig};
use crate::algorithm::localize::localize;
use crate::algorithm::reconcile::reconcile;
use crate::algorithm::series::select_axial_brain_windows;
use crate::algorithm::split::{train_test_split, without_identifier};
use crate::algorithm::volumes::compute_volume_deltas;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::models::{CohortRecord, ScanFolder, ScanVolumeRecord, StudyRecord};
use crate::registry::{identifiers, image_index, inclusion_list, manifest, predictions, rad_reports, review};
use crate::utils::io::{write_csv, write_lines};

/// Run the full pipeline against the configured snapshot
pub fn run(config: &PipelineConfig) -> Result<()> {
    let start = Instant::now();

    let studies = run_reconcile(config)?;
    let scan_folders = run_localize(config)?;
    let headers = run_headers(config, &scan_folders)?;
    let scan_volumes = run_volumes(config, &scan_folders, &headers)?;
    let cohort = run_inclusion(config, scan_volumes, &studies)?;
    run_split(config, &cohort)?;

    info!("Pipeline completed in {:?}", start.elapsed());
    Ok(())
}

/// Stage 1: identifier reconciliation
pub fn run_reconcile(config: &PipelineConfig) -> Result<Vec<StudyRecord>> {
    let index = image_index::load(&config.image_index_path)?;
    let reports = rad_reports::load(&config.rad_reports_path)?;
    let ids = identifiers::load(&config.identifiers_path)?;

    let (studies, _) = reconcile(&index, &reports, &ids)?;
    write_csv(
        &config.artifact_path("suid_rad_reports.csv"),
        &[StudyRecord::to_batch(&studies)?],
    )?;
    Ok(studies)
}

/// Stage 2: scan localization
pub fn run_localize(config: &PipelineConfig) -> Result<Vec<ScanFolder>> {
    let inclusion = inclusion_list::load(&config.scan_inclusion_path)?;
    let manifests = manifest::load_all(&config.manifest_batches)?;

    let (folders, summary) = localize(&inclusion, &manifests)?;
    write_csv(
        &config.artifact_path("tbi_scan_file_paths.csv"),
        &[ScanFolder::to_batch(&folders)?],
    )?;
    if summary.fully_resolved() {
        info!("All scans and file paths found");
    }
    Ok(folders)
}

/// Stages 3-4: header abstraction and series selection
pub fn run_headers(
    config: &PipelineConfig,
    scan_folders: &[ScanFolder],
) -> Result<arrow::record_batch::RecordBatch> {
    let folder_paths: Vec<String> = scan_folders.iter().map(|s| s.file_path.clone()).collect();
    let series = crate::dicom::find_series(&folder_paths);
    let headers = crate::dicom::extract_headers(&series);

    write_csv(
        &config.artifact_path("dicom_header_table.csv"),
        &[crate::dicom::to_long_batch(&headers)?],
    )?;
    let wide = crate::dicom::pivot_headers(&headers)?;
    write_csv(
        &config.artifact_path("dicom_header_table_processed.csv"),
        &[wide.clone()],
    )?;

    let selection = select_axial_brain_windows(&wide)?;
    write_csv(
        &config.artifact_path("dicom_header_table_axial_brain_window_processed.csv"),
        &[selection.table.clone()],
    )?;
    write_lines(
        &config.artifact_path("axial_brain_folders.txt"),
        &selection.folders,
    )?;

    Ok(selection.table)
}

/// Stages 5-6: prediction aggregation, deduplication, volume deltas
pub fn run_volumes(
    config: &PipelineConfig,
    scan_folders: &[ScanFolder],
    headers: &arrow::record_batch::RecordBatch,
) -> Result<Vec<ScanVolumeRecord>> {
    let prediction_records = predictions::load(&config.predictions_dir)?;
    let slice_counts = slice_count_index(headers)?;
    let (prepared, _) = prepare_predictions(&prediction_records, scan_folders, &slice_counts)?;
    write_csv(
        &config.artifact_path("prepped_predictions.csv"),
        &[crate::algorithm::aggregate::PreparedPrediction::to_batch(&prepared)?],
    )?;

    let overrides = review::load_image_overrides(
        &config.review_workbook_path,
        &config.multiple_image_sheet,
    )?;
    let dedup_config = DedupConfig {
        problem_scan_ids: &config.problem_scan_ids,
        min_slices: config.min_slices,
        max_slices: config.max_slices,
        overrides: &overrides,
    };
    let (deduplicated, _) = dedup_sessions(prepared, &dedup_config)?;

    let scan_volumes = compute_volume_deltas(deduplicated);
    write_csv(
        &config.artifact_path("tbi_scans_volumes.csv"),
        &[ScanVolumeRecord::to_batch(&scan_volumes)?],
    )?;
    Ok(scan_volumes)
}

/// Stage 7: cohort inclusion
pub fn run_inclusion(
    config: &PipelineConfig,
    scan_volumes: Vec<ScanVolumeRecord>,
    studies: &[StudyRecord],
) -> Result<CohortTables> {
    let patient_reviews =
        review::load_patient_reviews(&config.review_workbook_path, &config.inclusion_sheet)?;
    let scan_exclusions = review::load_scan_exclusions(
        &config.review_workbook_path,
        &config.scans_to_exclude_sheet,
    )?;
    let chart_reviews = review::load_chart_reviews(
        &config.chart_review_workbook_path,
        &config.chart_review_sheet,
    )?;

    let inclusion_config = InclusionConfig {
        patient_reviews: &patient_reviews,
        scan_exclusions: &scan_exclusions,
        chart_reviews: &chart_reviews,
        follow_up_window_hours: config.follow_up_window_hours,
        baseline_volume_ml: config.baseline_volume_ml,
        outcome_thresholds_ml: &config.outcome_thresholds_ml,
    };
    let (cohort, _) = build_cohort(scan_volumes, studies, &inclusion_config)?;

    write_csv(
        &config.artifact_path("tbi_data_all_scans.csv"),
        &[CohortRecord::to_batch(
            &cohort.all_scans,
            &config.outcome_thresholds_ml,
        )?],
    )?;
    write_csv(
        &config.artifact_path("tbi_data_first_scan.csv"),
        &[CohortRecord::to_batch(
            &cohort.first_scans,
            &config.outcome_thresholds_ml,
        )?],
    )?;
    Ok(cohort)
}

/// Stage 8: train/test preparation
pub fn run_split(config: &PipelineConfig, cohort: &CohortTables) -> Result<()> {
    let tables = train_test_split(
        &cohort.first_scans,
        &config.outcome_thresholds_ml,
        config.test_fraction,
        config.split_seed,
    )?;

    write_csv(&config.artifact_path("X_train_id.csv"), &[tables.x_train.clone()])?;
    write_csv(&config.artifact_path("X_test_id.csv"), &[tables.x_test.clone()])?;
    write_csv(&config.artifact_path("y_train_id.csv"), &[tables.y_train.clone()])?;
    write_csv(&config.artifact_path("y_test_id.csv"), &[tables.y_test.clone()])?;

    write_csv(
        &config.artifact_path("X_train.csv"),
        &[without_identifier(&tables.x_train)?],
    )?;
    write_csv(
        &config.artifact_path("X_test.csv"),
        &[without_identifier(&tables.x_test)?],
    )?;
    write_csv(
        &config.artifact_path("y_train.csv"),
        &[without_identifier(&tables.y_train)?],
    )?;
    write_csv(
        &config.artifact_path("y_test.csv"),
        &[without_identifier(&tables.y_test)?],
    )?;

    Ok(())
}
