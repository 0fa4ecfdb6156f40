//! Longitudinal volume deltas
//!
//! For each patient, scans are ordered by acquisition time and every
//! volume is expressed relative to the chronologically first scan:
//! per-compartment baselines, per-compartment changes, and the change of
//! the total hemorrhage volume.

use itertools::Itertools;
use log::info;

use crate::algorithm::aggregate::PreparedPrediction;
use crate::models::{CompartmentVolumes, ScanVolumeRecord};

/// Compute first-scan baselines and deltas for deduplicated sessions.
///
/// The input need not be ordered; output records come back sorted by
/// (patient, acquisition time) with the sort stable, so a patient whose
/// scans share a timestamp keeps their input order.
pub fn compute_volume_deltas(records: Vec<PreparedPrediction>) -> Vec<ScanVolumeRecord> {
    let mut records = records;
    records.sort_by(|a, b| {
        (a.unique_study_id.as_str(), a.study_datetime)
            .cmp(&(b.unique_study_id.as_str(), b.study_datetime))
    });

    let mut output: Vec<ScanVolumeRecord> = Vec::with_capacity(records.len());
    let by_patient = records.into_iter().chunk_by(|r| r.unique_study_id.clone());
    for (_, group) in &by_patient {
        let scans: Vec<PreparedPrediction> = group.collect();
        let baseline: CompartmentVolumes = scans
            .first()
            .map(|first| first.volumes)
            .unwrap_or_default();
        let baseline_total = baseline.hemorrhage_total();

        for scan in scans {
            let total = scan.volumes.hemorrhage_total();
            output.push(ScanVolumeRecord {
                unique_study_id: scan.unique_study_id,
                report_num: scan.report_num,
                scan_id: scan.scan_id,
                scan_number: scan.scan_number,
                study_datetime: scan.study_datetime,
                flag_post_trauma_hem: scan.flag_post_trauma_hem,
                folder: scan.folder,
                image_name: scan.image_name,
                image: scan.image,
                prediction: scan.prediction,
                slice_count: scan.slice_count,
                volumes: scan.volumes,
                quality_control_metric: scan.quality_metric,
                total_volume_ml: total,
                first_scan_volumes: baseline,
                first_scan_total_ml: baseline_total,
                change_from_first: scan.volumes.change_from(&baseline),
                change_total_ml: total - baseline_total,
            });
        }
    }

    info!("Computed volume deltas for {} scans", output.len());
    output
}

/// Recompute baselines and deltas in place after exclusions changed which
/// scan is a patient's first. Records must already be ordered by
/// (patient, acquisition time).
pub fn recompute_deltas(records: &mut [ScanVolumeRecord]) {
    let mut index = 0;
    while index < records.len() {
        let patient = records[index].unique_study_id.clone();
        let baseline = records[index].volumes;
        let baseline_total = baseline.hemorrhage_total();

        let mut cursor = index;
        while cursor < records.len() && records[cursor].unique_study_id == patient {
            let record = &mut records[cursor];
            record.first_scan_volumes = baseline;
            record.first_scan_total_ml = baseline_total;
            record.change_from_first = record.volumes.change_from(&baseline);
            record.change_total_ml = record.total_volume_ml - baseline_total;
            cursor += 1;
        }
        index = cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn dt(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 3, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn scan(usid: &str, day: u32, iph: f64) -> PreparedPrediction {
        PreparedPrediction {
            scan_id: format!("scan_{usid}_{day}"),
            image: String::new(),
            prediction: String::new(),
            volumes: CompartmentVolumes {
                iph,
                ..CompartmentVolumes::default()
            },
            quality_metric: 1.0,
            unique_study_id: usid.to_string(),
            report_num: format!("CT{usid}{day}"),
            folder: format!("F{day}"),
            image_name: "head".to_string(),
            study_datetime: dt(day),
            flag_post_trauma_hem: None,
            scan_number: day,
            slice_count: 40,
        }
    }

    #[test]
    fn identical_volumes_give_zero_deltas() {
        let records = vec![scan("1", 10, 5.0), scan("1", 11, 5.0)];
        let output = compute_volume_deltas(records);
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].change_from_first.iph, 0.0);
        assert_eq!(output[1].change_from_first.iph, 0.0);
        assert_eq!(output[1].change_total_ml, 0.0);
    }

    #[test]
    fn delta_series_is_relative_to_first_scan() {
        // Input deliberately out of order; the stage sorts by time.
        let records = vec![scan("1", 12, 10.0), scan("1", 10, 2.0)];
        let output = compute_volume_deltas(records);
        assert_eq!(output[0].volumes.iph, 2.0);
        assert_eq!(output[0].change_from_first.iph, 0.0);
        assert_eq!(output[1].change_from_first.iph, 8.0);
        assert_eq!(output[1].first_scan_total_ml, 2.0);
    }

    #[test]
    fn baselines_are_per_patient() {
        let records = vec![
            scan("1", 10, 2.0),
            scan("1", 11, 6.0),
            scan("2", 10, 100.0),
            scan("2", 12, 90.0),
        ];
        let output = compute_volume_deltas(records);
        assert_eq!(output[1].change_from_first.iph, 4.0);
        assert_eq!(output[3].change_from_first.iph, -10.0);
    }

    #[test]
    fn recompute_uses_new_first_scan() {
        let records = vec![scan("1", 10, 2.0), scan("1", 11, 6.0), scan("1", 12, 9.0)];
        let mut output = compute_volume_deltas(records);
        // Drop the original first scan, as an exclusion would.
        output.remove(0);
        recompute_deltas(&mut output);
        assert_eq!(output[0].change_from_first.iph, 0.0);
        assert_eq!(output[1].change_from_first.iph, 3.0);
    }
}
