// src/quality/mod.rs
//
// Duplicate-record checks between cleaning and publication. Duplicates are
// auto-remediated (keep-first) rather than rejected; `quality_passed` is the
// extension point for hard-fail rules and is the single proceed/abort signal
// the pipeline honors.

use crate::table::{self, DedupCounts};
use anyhow::Result;
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Reserved for hard-fail quality rules. The current rule set never produces
/// it: duplicates are remediated, not rejected.
#[derive(Debug, Error)]
#[error("data quality validation failed: {0}")]
pub struct ValidationError(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub grades_duplicates: DedupCounts,
    pub attendance_duplicates: DedupCounts,
    pub quality_passed: bool,
}

/// Dedup grades by `entry_id` and attendance by `record_id`, falling back to
/// `student_id` when the row-level key is missing. Keep-first, counts
/// reported. Demographics passes through untouched (already deduplicated by
/// its cleaner).
pub fn data_quality_checks(
    demographics: &RecordBatch,
    grades: &RecordBatch,
    attendance: &RecordBatch,
) -> Result<(RecordBatch, RecordBatch, RecordBatch, QualityReport)> {
    info!("running data quality checks");

    let (grades, grades_duplicates) = dedup_by_row_key(grades, "entry_id", "grades")?;
    let (attendance, attendance_duplicates) =
        dedup_by_row_key(attendance, "record_id", "attendance")?;

    let quality_passed = true;
    if quality_passed {
        info!("all data quality checks passed");
    }

    let report = QualityReport {
        grades_duplicates,
        attendance_duplicates,
        quality_passed,
    };
    Ok((demographics.clone(), grades, attendance, report))
}

fn dedup_by_row_key(
    batch: &RecordBatch,
    preferred_key: &str,
    dataset: &str,
) -> Result<(RecordBatch, DedupCounts)> {
    let key = if table::column_index(batch, preferred_key).is_some() {
        preferred_key
    } else if table::column_index(batch, "student_id").is_some() {
        "student_id"
    } else {
        return Ok((batch.clone(), DedupCounts::default()));
    };

    let (deduped, counts) = table::dedup_keep_first(batch, key)?;
    if counts.found > 0 {
        warn!(
            dataset,
            key,
            found = counts.found,
            removed = counts.removed,
            "duplicate rows remediated"
        );
    }
    Ok((deduped, counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{string_column, utf8_table};

    #[test]
    fn grades_dedup_by_entry_id_keeps_first() {
        let demo = utf8_table(&[("student_id", &[Some("1")])]);
        let grades = utf8_table(&[
            ("entry_id", &[Some("e1"), Some("e1"), Some("e2")]),
            ("grade", &[Some("A"), Some("B"), Some("C")]),
        ]);
        let att = utf8_table(&[("record_id", &[Some("r1")])]);

        let (_, grades, _, report) = data_quality_checks(&demo, &grades, &att).unwrap();
        assert_eq!(grades.num_rows(), 2);
        assert_eq!(report.grades_duplicates.found, 2);
        assert_eq!(report.grades_duplicates.removed, 1);
        assert_eq!(string_column(&grades, "grade").unwrap().value(0), "A");
        assert!(report.quality_passed);
    }

    #[test]
    fn falls_back_to_student_id_when_row_key_missing() {
        let demo = utf8_table(&[("student_id", &[Some("1")])]);
        let grades = utf8_table(&[("student_id", &[Some("1"), Some("1")])]);
        let att = utf8_table(&[
            ("student_id", &[Some("1"), Some("1")]),
            ("date", &[Some("20250901"), Some("20250902")]),
        ]);

        let (_, grades, att, report) = data_quality_checks(&demo, &grades, &att).unwrap();
        assert_eq!(grades.num_rows(), 1);
        assert_eq!(report.grades_duplicates.removed, 1);
        // attendance has no record_id either, so student_id applies there too
        assert_eq!(att.num_rows(), 1);
        assert_eq!(report.attendance_duplicates.removed, 1);
    }
}
