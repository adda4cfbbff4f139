// src/clean/mod.rs
//
// Per-dataset record cleaners. Each cleaner applies the shared field
// normalizers plus its dataset-specific repairs and returns the cleaned
// batch together with structured counts for the caller to log or assert on.

mod attendance;
mod demographics;
mod grades;

pub use attendance::{clean_attendance, AttendanceReport};
pub use demographics::{clean_demographics, DemographicsReport};
pub use grades::{clean_grades, GradesReport};

pub(crate) use grades::grade_numeric_column;

use anyhow::Result;
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct CleaningReport {
    pub demographics: DemographicsReport,
    pub grades: GradesReport,
    pub attendance: AttendanceReport,
}

/// Run the full cleaning pass over the three raw tables.
pub fn run_cleaning(
    demographics: &RecordBatch,
    grades: &RecordBatch,
    attendance: &RecordBatch,
) -> Result<(RecordBatch, RecordBatch, RecordBatch, CleaningReport)> {
    info!("starting data cleaning");

    let (demographics, demographics_report) = clean_demographics(demographics)?;
    let (grades, grades_report) = clean_grades(grades)?;
    let (attendance, attendance_report) = clean_attendance(attendance)?;

    info!(
        demographics_rows = demographics.num_rows(),
        grades_rows = grades.num_rows(),
        attendance_rows = attendance.num_rows(),
        "data cleaning completed"
    );

    let report = CleaningReport {
        demographics: demographics_report,
        grades: grades_report,
        attendance: attendance_report,
    };
    Ok((demographics, grades, attendance, report))
}
