// src/transform/mod.rs
//
// Second normalization pass between the quality gate and the join: type
// coercion and the missing-value policy. Every step here is idempotent so
// the unifier can re-run the id normalization without changing results.

use crate::clean::grade_numeric_column;
use crate::normalize::{normalize_student_id, parse_date_permissive, to_date32};
use crate::table;
use anyhow::Result;
use arrow::array::{Array, Date32Array, Float64Array, Int64Array};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Raw placeholders replaced with null before the numeric fill.
const MISSING_SENTINELS: &[&str] = &["", "NULL", "N/A", "na", "NaN", "\\"];

#[derive(Debug, Clone, Serialize)]
pub struct MissingValueReport {
    pub dataset: String,
    pub nulls_before: Vec<(String, usize)>,
    pub nulls_after: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformReport {
    pub demographics: MissingValueReport,
    pub grades: MissingValueReport,
    pub attendance: MissingValueReport,
}

/// Run the second-pass transformation over all three cleaned tables.
pub fn data_transform(
    demographics: &RecordBatch,
    grades: &RecordBatch,
    attendance: &RecordBatch,
) -> Result<(RecordBatch, RecordBatch, RecordBatch, TransformReport)> {
    info!("starting data transformation");

    let (demographics, demo_report) = transform_table(demographics, "demographics", false)?;
    let (grades, grades_report) = transform_table(grades, "grades", true)?;
    let (attendance, att_report) = transform_table(attendance, "attendance", false)?;

    info!("data transformation completed");
    let report = TransformReport {
        demographics: demo_report,
        grades: grades_report,
        attendance: att_report,
    };
    Ok((demographics, grades, attendance, report))
}

fn transform_table(
    batch: &RecordBatch,
    dataset: &str,
    convert_grades: bool,
) -> Result<(RecordBatch, MissingValueReport)> {
    let batch = normalize_student_id(batch)?;
    let batch = parse_start_date(&batch)?;
    let batch = if convert_grades {
        grade_numeric_column(&batch)?.0
    } else {
        batch
    };
    handle_missing_values(&batch, dataset)
}

/// Parse an optional `start_date` text column into Date32; unparseable
/// values become null. No-op when absent or already parsed.
fn parse_start_date(batch: &RecordBatch) -> Result<RecordBatch> {
    let Some(idx) = table::column_index(batch, "start_date") else {
        return Ok(batch.clone());
    };
    if batch.column(idx).data_type() != &DataType::Utf8 {
        return Ok(batch.clone());
    }
    let raw = table::string_column(batch, "start_date")
        .ok_or_else(|| anyhow::anyhow!("start_date column is not utf8"))?;
    let dates: Date32Array = raw
        .iter()
        .map(|v| v.and_then(parse_date_permissive).map(to_date32))
        .collect();
    table::with_column(batch, "start_date", Arc::new(dates))
}

/// Missing-value policy: sentinel strings to null, numeric nulls to 0, text
/// trimmed with `"nan"`/`"None"` literals to null. Null counts before and
/// after are reported for diagnostics only.
fn handle_missing_values(
    batch: &RecordBatch,
    dataset: &str,
) -> Result<(RecordBatch, MissingValueReport)> {
    let mut out = batch.clone();

    // 1) placeholder strings -> null
    for field in batch.schema().fields() {
        if field.data_type() == &DataType::Utf8 {
            out = table::map_string_column(&out, field.name(), |v| {
                v.and_then(|s| {
                    if MISSING_SENTINELS.contains(&s) {
                        None
                    } else {
                        Some(s.to_string())
                    }
                })
            })?;
        }
    }

    let nulls_before = table::null_counts(&out);
    debug!(dataset, ?nulls_before, "missing values before handling");

    // 2) numeric nulls -> 0, 3) text trimmed with stringified-null literals
    let schema = out.schema();
    for (idx, field) in schema.fields().iter().enumerate() {
        match field.data_type() {
            DataType::Float64 => {
                let col = out
                    .column(idx)
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(|| anyhow::anyhow!("column {} is not f64", field.name()))?;
                let filled: Float64Array = col.iter().map(|v| Some(v.unwrap_or(0.0))).collect();
                out = table::with_column(&out, field.name(), Arc::new(filled))?;
            }
            DataType::Int64 => {
                let col = out
                    .column(idx)
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .ok_or_else(|| anyhow::anyhow!("column {} is not i64", field.name()))?;
                let filled: Int64Array = col.iter().map(|v| Some(v.unwrap_or(0))).collect();
                out = table::with_column(&out, field.name(), Arc::new(filled))?;
            }
            DataType::Utf8 => {
                out = table::map_string_column(&out, field.name(), |v| {
                    v.and_then(|s| {
                        let t = s.trim();
                        match t {
                            "nan" | "None" => None,
                            _ => Some(t.to_string()),
                        }
                    })
                })?;
            }
            _ => {}
        }
    }

    let nulls_after = table::null_counts(&out);
    debug!(dataset, ?nulls_after, "missing values after handling");

    let report = MissingValueReport {
        dataset: dataset.to_string(),
        nulls_before,
        nulls_after,
    };
    Ok((out, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{string_column, utf8_table};

    #[test]
    fn grade_numeric_nulls_fill_to_zero() {
        let batch = utf8_table(&[
            ("student_id", &[Some("1"), Some("2")]),
            ("grade", &[Some("A-"), Some("XYZ")]),
        ]);
        let (_, grades, _, _) = data_transform(
            &utf8_table(&[("student_id", &[Some("1")])]),
            &batch,
            &utf8_table(&[("student_id", &[Some("1")])]),
        )
        .unwrap();
        let idx = grades.schema().index_of("grade_numeric").unwrap();
        let numeric = grades
            .column(idx)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(numeric.value(0), 91.0);
        assert_eq!(numeric.value(1), 0.0, "unknown grades fill to 0 after the policy");
    }

    #[test]
    fn sentinels_and_stringified_nulls_collapse() {
        let batch = utf8_table(&[
            ("student_id", &[Some("1"), Some("2"), Some("3"), Some("4")]),
            ("notes", &[Some("N/A"), Some(" nan "), Some("None"), Some(" keep ")]),
        ]);
        let (out, report) = transform_table(&batch, "demographics", false).unwrap();
        let notes = string_column(&out, "notes").unwrap();
        assert!(notes.is_null(0));
        assert!(notes.is_null(1));
        assert!(notes.is_null(2));
        assert_eq!(notes.value(3), "keep");
        let nulls = report
            .nulls_after
            .iter()
            .find(|(name, _)| name == "notes")
            .unwrap();
        assert_eq!(nulls.1, 3);
    }

    #[test]
    fn start_date_parses_when_present() {
        let batch = utf8_table(&[
            ("student_id", &[Some("1"), Some("2")]),
            ("start_date", &[Some("2024-08-20"), Some("junk")]),
        ]);
        let (out, _) = transform_table(&batch, "attendance", false).unwrap();
        let idx = out.schema().index_of("start_date").unwrap();
        let dates = out
            .column(idx)
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        assert!(!dates.is_null(0));
        assert!(dates.is_null(1));
    }

    #[test]
    fn student_id_renormalization_is_idempotent() {
        let batch = utf8_table(&[("student_id", &[Some("SID-3"), Some("3")])]);
        let (once, _) = transform_table(&batch, "demographics", false).unwrap();
        let (twice, _) = transform_table(&once, "demographics", false).unwrap();
        let a = string_column(&once, "student_id").unwrap();
        let b = string_column(&twice, "student_id").unwrap();
        assert_eq!(a.value(0), "3");
        assert_eq!(a.value(0), b.value(0));
        assert_eq!(a.value(1), b.value(1));
    }
}
