// src/clean/attendance.rs

use crate::normalize::{fix_compact_date, normalize_student_id, scrub_text, to_date32};
use crate::table;
use anyhow::Result;
use arrow::array::{Array, Date32Array};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
    pub rows_in: usize,
    pub unparseable_dates: usize,
}

/// Clean the attendance table. One row per student per day; student_id is
/// deliberately not deduplicated here.
pub fn clean_attendance(batch: &RecordBatch) -> Result<(RecordBatch, AttendanceReport)> {
    let rows_in = batch.num_rows();
    info!(rows = rows_in, "cleaning attendance");

    let mut batch = batch.clone();
    for col in ["reason", "attendance_status"] {
        batch = table::map_string_column(&batch, col, |v| v.and_then(scrub_text))?;
    }

    let (batch, unparseable_dates) = normalize_date_column(&batch)?;
    if unparseable_dates > 0 {
        warn!(count = unparseable_dates, "attendance dates failed to parse");
    }

    let batch = normalize_student_id(&batch)?;

    Ok((batch, AttendanceReport { rows_in, unparseable_dates }))
}

/// Rewrite the compact-numeric `date` column as Date32, counting values the
/// fixed-format repair could not recover.
fn normalize_date_column(batch: &RecordBatch) -> Result<(RecordBatch, usize)> {
    let Some(idx) = table::column_index(batch, "date") else {
        return Ok((batch.clone(), 0));
    };
    // Already parsed on a defensive re-run.
    if !matches!(
        batch.column(idx).data_type(),
        arrow::datatypes::DataType::Utf8
    ) {
        return Ok((batch.clone(), 0));
    }
    let raw = table::string_column(batch, "date")
        .ok_or_else(|| anyhow::anyhow!("date column is not utf8"))?;

    let mut unparseable = 0usize;
    let dates: Date32Array = raw
        .iter()
        .map(|v| {
            let parsed = v.and_then(fix_compact_date).map(to_date32);
            if parsed.is_none() && v.is_some() {
                unparseable += 1;
            }
            parsed
        })
        .collect();
    let batch = table::with_column(batch, "date", Arc::new(dates))?;
    Ok((batch, unparseable))
}
