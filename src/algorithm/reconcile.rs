//! Identifier reconciliation
//!
//! The image index, the report export, and the master identifier list all
//! describe the same studies under different accession forms. This stage
//! joins the three into one study table keyed by `unique_study_id` and the
//! derived report number.

use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::accession::report_number;
use crate::error::Result;
use crate::models::StudyRecord;
use crate::registry::identifiers::IdentifierRow;
use crate::registry::image_index::ImageIndexRow;
use crate::registry::rad_reports::RadReportRow;

/// Row counts of the reconciliation joins, for diagnostics and tests
#[derive(Debug, Clone, Default)]
pub struct ReconcileSummary {
    pub image_index_rows: usize,
    pub report_rows: usize,
    /// Rows after the image-index/report join
    pub merged_rows: usize,
    /// Rows after attaching `unique_study_id`
    pub identified_rows: usize,
}

/// Join the image index, report export, and identifier list into study
/// records.
///
/// Both joins are inner joins: a study without a matching report, or
/// without an assigned identifier, drops out. The summary carries the row
/// counts the source workflow verified by eye.
pub fn reconcile(
    image_index: &[ImageIndexRow],
    reports: &[RadReportRow],
    identifiers: &[IdentifierRow],
) -> Result<(Vec<StudyRecord>, ReconcileSummary)> {
    let mut summary = ReconcileSummary {
        image_index_rows: image_index.len(),
        report_rows: reports.len(),
        ..ReconcileSummary::default()
    };

    // Report export keyed by raw accession; the archive writes the same
    // form into EDWAccession.
    let mut reports_by_accession: FxHashMap<&str, Vec<&RadReportRow>> = FxHashMap::default();
    for report in reports {
        reports_by_accession
            .entry(report.accession.as_str())
            .or_default()
            .push(report);
    }

    // Identifier list keyed by the full alias triple.
    let mut id_by_aliases: FxHashMap<(&str, Option<&str>, &str), &IdentifierRow> =
        FxHashMap::default();
    for identifier in identifiers {
        let key = (
            identifier.search_accession.as_str(),
            identifier.vna_accession.as_deref(),
            identifier.edw_accession.as_str(),
        );
        if id_by_aliases.insert(key, identifier).is_some() {
            warn!(
                "Duplicate alias triple in identifier list: {} / {:?} / {}",
                identifier.search_accession, identifier.vna_accession, identifier.edw_accession
            );
        }
    }

    let mut records = Vec::new();
    for index_row in image_index {
        let Some(matched_reports) = reports_by_accession.get(index_row.edw_accession.as_str())
        else {
            continue;
        };

        for report in matched_reports {
            summary.merged_rows += 1;

            let key = (
                index_row.search_accession.as_str(),
                index_row.vna_accession.as_deref(),
                index_row.edw_accession.as_str(),
            );
            let Some(identifier) = id_by_aliases.get(&key) else {
                continue;
            };
            summary.identified_rows += 1;

            records.push(StudyRecord {
                unique_study_id: identifier.unique_study_id.clone(),
                report_num: report_number(&index_row.edw_accession),
                search_accession: index_row.search_accession.clone(),
                vna_accession: index_row.vna_accession.clone(),
                edw_accession: index_row.edw_accession.clone(),
                study_id: index_row.study_id.clone(),
                study_description: index_row.study_description.clone(),
                study_datetime: index_row.study_datetime,
                suids: index_row.suids.clone(),
                accession_normalized: index_row.accession_stripped.clone(),
                order_reason: report.order_reason.clone(),
                report: report.report.clone(),
                keyword_flags: report.keyword_flags,
            });
        }
    }

    info!(
        "Reconciled identifiers: {} index rows x {} reports -> {} merged, {} with unique_study_id",
        summary.image_index_rows, summary.report_rows, summary.merged_rows, summary.identified_rows
    );
    if summary.merged_rows > summary.identified_rows {
        warn!(
            "{} merged studies have no identifier assignment",
            summary.merged_rows - summary.identified_rows
        );
    }

    Ok((records, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeywordFlags;

    fn index_row(search: &str, edw: &str) -> ImageIndexRow {
        ImageIndexRow {
            search_accession: search.to_string(),
            vna_accession: None,
            edw_accession: edw.to_string(),
            study_id: None,
            study_description: None,
            suids: None,
            study_datetime: None,
            accession_stripped: crate::accession::strip_modality_markers(search),
        }
    }

    fn report_row(accession: &str) -> RadReportRow {
        RadReportRow {
            accession: accession.to_string(),
            order_reason: None,
            report: Some("no acute hemorrhage".to_string()),
            keyword_flags: KeywordFlags::default(),
            accession_stripped: crate::accession::strip_modality_markers(accession),
        }
    }

    #[test]
    fn inner_joins_drop_unmatched_rows() {
        let index = vec![index_row("*CT100", "NWMHCT100"), index_row("*CT200", "NWMHCT200")];
        let reports = vec![report_row("NWMHCT100")];
        let identifiers = vec![IdentifierRow {
            unique_study_id: "1".to_string(),
            search_accession: "*CT100".to_string(),
            vna_accession: None,
            edw_accession: "NWMHCT100".to_string(),
        }];

        let (records, summary) = reconcile(&index, &reports, &identifiers).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(summary.merged_rows, 1);
        assert_eq!(summary.identified_rows, 1);
        assert_eq!(records[0].unique_study_id, "1");
        assert_eq!(records[0].report_num, "CT100");
    }
}
