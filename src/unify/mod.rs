// src/unify/mod.rs
//
// Joins the three cleaned tables into one row-per-student-per-grade-per-
// attendance table. The left join is a hash join over `student_id` realized
// with the Arrow `take` kernel; null take indices materialize the null
// right-hand rows for unmatched students.

use crate::normalize::normalize_student_id;
use crate::table;
use anyhow::{anyhow, Result};
use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Join demographics to grades (`_demo`/`_grade` suffixes on colliding
/// names, both sides) and the result to attendance (`_attendance` suffix on
/// the attendance side only), then sanitize output column names for the
/// downstream sink.
pub fn unify_data(
    demographics: &RecordBatch,
    grades: &RecordBatch,
    attendance: &RecordBatch,
) -> Result<RecordBatch> {
    info!("starting to join demographics, grades, and attendance data");

    // Defensive idempotent pass before matching keys across datasets.
    let demographics = normalize_student_id(demographics)?;
    let grades = normalize_student_id(grades)?;
    let attendance = normalize_student_id(attendance)?;

    let demo_grades = left_join(
        &demographics,
        &grades,
        "student_id",
        Some("_demo"),
        "_grade",
    )?;
    let unified = left_join(&demo_grades, &attendance, "student_id", None, "_attendance")?;
    let unified = sanitize_column_names(&unified)?;

    info!(
        rows = unified.num_rows(),
        columns = unified.num_columns(),
        "unified data shape after joins"
    );
    Ok(unified)
}

/// Left join on a shared key column. Every left row appears at least once;
/// each match expands it. Colliding non-key column names get `left_suffix`
/// (when given) on the left and `right_suffix` on the right.
fn left_join(
    left: &RecordBatch,
    right: &RecordBatch,
    key: &str,
    left_suffix: Option<&str>,
    right_suffix: &str,
) -> Result<RecordBatch> {
    let left_keys = table::string_column(left, key)
        .ok_or_else(|| anyhow!("left table is missing join key {key}"))?;
    let right_keys = table::string_column(right, key)
        .ok_or_else(|| anyhow!("right table is missing join key {key}"))?;

    let mut index: HashMap<&str, Vec<u32>> = HashMap::new();
    for i in 0..right_keys.len() {
        if !right_keys.is_null(i) {
            index.entry(right_keys.value(i)).or_default().push(i as u32);
        }
    }

    let mut left_indices: Vec<u32> = Vec::new();
    let mut right_indices: Vec<Option<u32>> = Vec::new();
    for i in 0..left_keys.len() {
        let matches = if left_keys.is_null(i) {
            None
        } else {
            index.get(left_keys.value(i))
        };
        match matches {
            Some(rows) => {
                for &r in rows {
                    left_indices.push(i as u32);
                    right_indices.push(Some(r));
                }
            }
            None => {
                left_indices.push(i as u32);
                right_indices.push(None);
            }
        }
    }
    let left_indices = UInt32Array::from(left_indices);
    let right_indices = UInt32Array::from(right_indices);

    let left_schema = left.schema();
    let right_schema = right.schema();
    let left_names: HashSet<&str> = left_schema.fields().iter().map(|f| f.name().as_str()).collect();
    let right_names: HashSet<&str> = right_schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .collect();

    let mut fields: Vec<Field> = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();

    for (field, column) in left_schema.fields().iter().zip(left.columns()) {
        let name = field.name().as_str();
        let out_name = match left_suffix {
            Some(suffix) if name != key && right_names.contains(name) => format!("{name}{suffix}"),
            _ => name.to_string(),
        };
        fields.push(Field::new(out_name, field.data_type().clone(), true));
        columns.push(take(column.as_ref(), &left_indices, None)?);
    }

    for (field, column) in right_schema.fields().iter().zip(right.columns()) {
        let name = field.name().as_str();
        if name == key {
            continue;
        }
        let out_name = if left_names.contains(name) {
            format!("{name}{right_suffix}")
        } else {
            name.to_string()
        };
        fields.push(Field::new(out_name, field.data_type().clone(), true));
        columns.push(take(column.as_ref(), &right_indices, None)?);
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Trim a column name and replace every character outside `[A-Za-z0-9_]`
/// with `_`, as the downstream sink's naming rules require.
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Apply [`sanitize_name`] to every column of the batch.
pub fn sanitize_column_names(batch: &RecordBatch) -> Result<RecordBatch> {
    let fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| Field::new(sanitize_name(f.name()), f.data_type().clone(), f.is_nullable()))
        .collect();
    Ok(RecordBatch::try_new(
        Arc::new(Schema::new(fields)),
        batch.columns().to_vec(),
    )?)
}
