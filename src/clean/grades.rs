// src/clean/grades.rs

use crate::normalize::{grade_to_numeric, normalize_student_id};
use crate::table;
use anyhow::Result;
use arrow::array::{Array, Float64Array};
use arrow::record_batch::RecordBatch;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

static COURSE_ARTIFACTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\\']").unwrap());
static COURSE_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*").unwrap());
static COURSE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"course_name:\s*([^,]+)").unwrap());

#[derive(Debug, Clone, Serialize)]
pub struct GradesReport {
    pub rows_in: usize,
    /// Grades that parsed neither as a number nor as a letter grade. The
    /// rows are kept with an unknown grade_numeric so aggregation still
    /// sees every enrollment.
    pub unknown_grades: usize,
}

/// Clean the gradebook table. One row per course enrollment; student_id is
/// deliberately not deduplicated here.
pub fn clean_grades(batch: &RecordBatch) -> Result<(RecordBatch, GradesReport)> {
    let rows_in = batch.num_rows();
    info!(rows = rows_in, "cleaning gradebook");

    let mut batch = batch.clone();
    for col in ["credits_earned", "grade"] {
        batch = table::map_string_column(&batch, col, |v| {
            v.map(|s| s.trim().trim_end_matches('\\').trim_end().to_string())
        })?;
    }

    batch = table::map_string_column(&batch, "course_details", |v| {
        v.map(|s| {
            let s = COURSE_ARTIFACTS.replace_all(s, "");
            let s = COURSE_SEPARATOR.replace_all(&s, ": ");
            let s = s.trim();
            match COURSE_NAME.captures(s) {
                Some(caps) => caps[1].trim().to_string(),
                None => s.to_string(),
            }
        })
    })?;

    let (batch, unknown_grades) = grade_numeric_column(&batch)?;
    if unknown_grades > 0 {
        info!(count = unknown_grades, "grades kept with unknown grade_numeric");
    }

    let batch = normalize_student_id(&batch)?;

    Ok((batch, GradesReport { rows_in, unknown_grades }))
}

/// Derive (or re-derive) `grade_numeric` from `grade`. Idempotent: the
/// transformer re-runs this defensively after cleaning.
pub(crate) fn grade_numeric_column(batch: &RecordBatch) -> Result<(RecordBatch, usize)> {
    let Some(grades) = table::string_column(batch, "grade") else {
        return Ok((batch.clone(), 0));
    };
    let mut unknown = 0usize;
    let numeric: Float64Array = grades
        .iter()
        .map(|v| {
            let parsed = v.and_then(grade_to_numeric);
            if parsed.is_none() && v.is_some() {
                unknown += 1;
            }
            parsed
        })
        .collect();
    let batch = table::with_column(batch, "grade_numeric", Arc::new(numeric))?;
    Ok((batch, unknown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{string_column, utf8_table};

    fn grade_numeric(batch: &RecordBatch) -> &Float64Array {
        let idx = batch.schema().index_of("grade_numeric").unwrap();
        batch
            .column(idx)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
    }

    #[test]
    fn letter_grades_map_to_midpoints_and_bad_rows_survive() {
        let batch = utf8_table(&[
            ("student_id", &[Some("s-1"), Some("s-1"), Some("s-2")]),
            ("grade", &[Some("B+"), Some("XYZ"), Some("91.5\\")]),
        ]);
        let (out, report) = clean_grades(&batch).unwrap();
        assert_eq!(out.num_rows(), 3, "invalid grades are retained");
        assert_eq!(report.unknown_grades, 1);
        let numeric = {
            let idx = out.schema().index_of("grade_numeric").unwrap();
            out.column(idx)
                .as_any()
                .downcast_ref::<Float64Array>()
                .unwrap()
                .clone()
        };
        assert_eq!(numeric.value(0), 88.0);
        assert!(numeric.is_null(1));
        assert_eq!(numeric.value(2), 91.5);
    }

    #[test]
    fn course_details_dictionary_text_is_extracted() {
        let batch = utf8_table(&[
            ("student_id", &[Some("1"), Some("2")]),
            (
                "course_details",
                &[
                    Some("{course_name - Algebra I, period - 3}"),
                    Some("Plain Biology\\"),
                ],
            ),
        ]);
        let (out, _) = clean_grades(&batch).unwrap();
        let details = string_column(&out, "course_details").unwrap();
        assert_eq!(details.value(0), "Algebra I");
        assert_eq!(details.value(1), "Plain Biology");
    }

    #[test]
    fn student_ids_are_normalized_but_not_deduplicated() {
        let batch = utf8_table(&[
            ("student_id", &[Some("sid-9"), Some("SID-9")]),
            ("grade", &[Some("A"), Some("B")]),
        ]);
        let (out, _) = clean_grades(&batch).unwrap();
        assert_eq!(out.num_rows(), 2);
        let ids = string_column(&out, "student_id").unwrap();
        assert_eq!(ids.value(0), "9");
        assert_eq!(ids.value(1), "9");
    }

    #[test]
    fn grade_numeric_is_idempotent() {
        let batch = utf8_table(&[
            ("student_id", &[Some("1")]),
            ("grade", &[Some("C+")]),
        ]);
        let (once, _) = grade_numeric_column(&batch).unwrap();
        let (twice, unknown) = grade_numeric_column(&once).unwrap();
        assert_eq!(unknown, 0);
        assert_eq!(grade_numeric(&twice).value(0), 78.0);
        assert_eq!(once.num_columns(), twice.num_columns());
    }
}
