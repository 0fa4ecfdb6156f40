//! Imaging study records after identifier reconciliation

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use smallvec::SmallVec;

use crate::error::Result;

/// Keyword-detection flags carried over from the report annotation tool.
///
/// Each flag records whether the keyword-matching pass found the term in
/// the free-text radiology report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeywordFlags {
    pub trauma: bool,
    pub fall: bool,
    pub injury: bool,
    pub assault: bool,
    pub auto: bool,
    pub any_trauma: bool,
    pub hemorrhage: bool,
    pub posttraumatic_hemorrhage: bool,
}

/// One imaging study with its reconciled identifiers and report
#[derive(Debug, Clone)]
pub struct StudyRecord {
    /// Stable de-identified patient/study identifier
    pub unique_study_id: String,
    /// `CT`-prefixed report number derived from the archive accession
    pub report_num: String,
    /// Accession as exported by the imaging search tool
    pub search_accession: String,
    /// Accession as stored in the vendor-neutral archive
    pub vna_accession: Option<String>,
    /// Accession as stored in the data warehouse
    pub edw_accession: String,
    /// Archive-internal study id
    pub study_id: Option<String>,
    pub study_description: Option<String>,
    /// Acquisition timestamp parsed from `StudyDate` + `StudyTime`
    pub study_datetime: Option<NaiveDateTime>,
    /// Series instance UIDs found for the study
    pub suids: Option<String>,
    /// Normalized accession used as the join key
    pub accession_normalized: String,
    /// Order reason from the report export
    pub order_reason: Option<String>,
    /// Free-text radiology report
    pub report: Option<String>,
    pub keyword_flags: KeywordFlags,
}

impl StudyRecord {
    /// All accession aliases this study is known under, for diagnostics
    /// and alias-based joins.
    #[must_use]
    pub fn accession_aliases(&self) -> SmallVec<[&str; 3]> {
        let mut aliases: SmallVec<[&str; 3]> = SmallVec::new();
        aliases.push(self.search_accession.as_str());
        if let Some(vna) = self.vna_accession.as_deref() {
            aliases.push(vna);
        }
        aliases.push(self.edw_accession.as_str());
        aliases
    }

    /// Convert records to a record batch for the reconciliation artifact
    pub fn to_batch(records: &[Self]) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("unique_study_id", DataType::Utf8, false),
            Field::new("report_num_temp", DataType::Utf8, false),
            Field::new("SearchAccession", DataType::Utf8, false),
            Field::new("VNAAccession", DataType::Utf8, true),
            Field::new("EDWAccession", DataType::Utf8, false),
            Field::new("StudyID", DataType::Utf8, true),
            Field::new("StudyDescription", DataType::Utf8, true),
            Field::new("StudyDate_Time_format", DataType::Utf8, true),
            Field::new("SUIDs", DataType::Utf8, true),
            Field::new("SearchAccession_temp", DataType::Utf8, false),
            Field::new("order_reason", DataType::Utf8, true),
            Field::new("trauma", DataType::Boolean, false),
            Field::new("fall", DataType::Boolean, false),
            Field::new("injury", DataType::Boolean, false),
            Field::new("assault", DataType::Boolean, false),
            Field::new("auto", DataType::Boolean, false),
            Field::new("any_trauma", DataType::Boolean, false),
            Field::new("hemorrhage", DataType::Boolean, false),
            Field::new("posttraumatic_hemorrhage", DataType::Boolean, false),
            Field::new("report", DataType::Utf8, true),
        ]));

        let strings = |f: fn(&Self) -> &str| -> ArrayRef {
            Arc::new(records.iter().map(|r| Some(f(r))).collect::<StringArray>())
        };
        let opt_strings = |f: fn(&Self) -> Option<&str>| -> ArrayRef {
            Arc::new(records.iter().map(f).collect::<StringArray>())
        };
        let flags = |f: fn(&KeywordFlags) -> bool| -> ArrayRef {
            Arc::new(
                records
                    .iter()
                    .map(|r| Some(f(&r.keyword_flags)))
                    .collect::<BooleanArray>(),
            )
        };

        let columns: Vec<ArrayRef> = vec![
            strings(|r| &r.unique_study_id),
            strings(|r| &r.report_num),
            strings(|r| &r.search_accession),
            opt_strings(|r| r.vna_accession.as_deref()),
            strings(|r| &r.edw_accession),
            opt_strings(|r| r.study_id.as_deref()),
            opt_strings(|r| r.study_description.as_deref()),
            Arc::new(
                records
                    .iter()
                    .map(|r| {
                        r.study_datetime
                            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    })
                    .collect::<StringArray>(),
            ),
            opt_strings(|r| r.suids.as_deref()),
            strings(|r| &r.accession_normalized),
            opt_strings(|r| r.order_reason.as_deref()),
            flags(|f| f.trauma),
            flags(|f| f.fall),
            flags(|f| f.injury),
            flags(|f| f.assault),
            flags(|f| f.auto),
            flags(|f| f.any_trauma),
            flags(|f| f.hemorrhage),
            flags(|f| f.posttraumatic_hemorrhage),
            opt_strings(|r| r.report.as_deref()),
        ];

        Ok(RecordBatch::try_new(schema, columns)?)
    }
}
