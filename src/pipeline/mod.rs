// src/pipeline/mod.rs
//
// End-to-end orchestration: load, clean, quality gate, transform, unify,
// publish, refresh the feature view. Any failure past cleaning terminates
// the run; there is no partial-result recovery.

use crate::clean::{run_cleaning, CleaningReport};
use crate::features::{AggregationService, QueryError, UNIFIED_TABLE};
use crate::ingest::{load_csv, LoadError};
use crate::quality::{data_quality_checks, QualityReport, ValidationError};
use crate::sink::{Destination, SinkError, TableSink, WriteMode};
use crate::transform::{data_transform, TransformReport};
use crate::unify::unify_data;
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info};

pub const DEMOGRAPHICS_FILE: &str = "student_demographics.csv";
pub const GRADES_FILE: &str = "gradebook_export.csv";
pub const ATTENDANCE_FILE: &str = "attendance_records.csv";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the three fixed-name input files.
    pub data_dir: PathBuf,
    /// Warehouse dataset the unified table is published into.
    pub dataset: String,
    pub failure_cutoff: f64,
    pub mode: WriteMode,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("pipeline stage failed: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub cleaning: CleaningReport,
    pub quality: QualityReport,
    pub transform: TransformReport,
    pub unified_rows: usize,
    pub unified_columns: usize,
    pub destination: String,
}

/// Load the three input files and run the pipeline over them.
pub fn run(
    config: &PipelineConfig,
    sink: &dyn TableSink,
    aggregation: &dyn AggregationService,
) -> Result<RunReport, PipelineError> {
    info!("starting student records pipeline");

    let demographics = load_csv(&config.data_dir.join(DEMOGRAPHICS_FILE))?;
    let grades = load_csv(&config.data_dir.join(GRADES_FILE))?;
    let attendance = load_csv(&config.data_dir.join(ATTENDANCE_FILE))?;

    run_tables(&demographics, &grades, &attendance, config, sink, aggregation)
}

/// Pipeline body over already-loaded tables. Separate from [`run`] so tests
/// and embedders can drive it without touching the filesystem.
pub fn run_tables(
    demographics: &RecordBatch,
    grades: &RecordBatch,
    attendance: &RecordBatch,
    config: &PipelineConfig,
    sink: &dyn TableSink,
    aggregation: &dyn AggregationService,
) -> Result<RunReport, PipelineError> {
    let (demographics, grades, attendance, cleaning) =
        run_cleaning(demographics, grades, attendance)?;

    let (demographics, grades, attendance, quality) =
        data_quality_checks(&demographics, &grades, &attendance)?;
    if !quality.quality_passed {
        error!("pipeline terminated due to data quality failure");
        return Err(ValidationError("quality gate rejected the run".to_string()).into());
    }

    let (demographics, grades, attendance, transform) =
        data_transform(&demographics, &grades, &attendance)?;

    let unified = unify_data(&demographics, &grades, &attendance)?;

    let destination = Destination {
        dataset: config.dataset.clone(),
        table: UNIFIED_TABLE.to_string(),
    };
    sink.publish(&unified, &destination, config.mode)?;
    aggregation.refresh_feature_view(config.failure_cutoff)?;

    info!("pipeline completed successfully");
    Ok(RunReport {
        cleaning,
        quality,
        transform,
        unified_rows: unified.num_rows(),
        unified_columns: unified.num_columns(),
        destination: destination.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::utf8_table;
    use std::cell::RefCell;

    struct CaptureSink {
        published: RefCell<Option<(RecordBatch, String)>>,
    }

    impl CaptureSink {
        fn new() -> Self {
            Self {
                published: RefCell::new(None),
            }
        }
    }

    impl TableSink for CaptureSink {
        fn publish(
            &self,
            batch: &RecordBatch,
            destination: &Destination,
            _mode: WriteMode,
        ) -> Result<(), SinkError> {
            *self.published.borrow_mut() = Some((batch.clone(), destination.to_string()));
            Ok(())
        }
    }

    struct NoopAggregation;
    impl AggregationService for NoopAggregation {
        fn refresh_feature_view(&self, _failure_cutoff: f64) -> Result<(), QueryError> {
            Ok(())
        }
    }

    struct FailingAggregation;
    impl AggregationService for FailingAggregation {
        fn refresh_feature_view(&self, _failure_cutoff: f64) -> Result<(), QueryError> {
            Err(QueryError::Execution(anyhow::anyhow!("warehouse down")))
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            data_dir: PathBuf::from("unused"),
            dataset: "raw_student_data".to_string(),
            failure_cutoff: 65.0,
            mode: WriteMode::Replace,
        }
    }

    fn fixtures() -> (RecordBatch, RecordBatch, RecordBatch) {
        let demographics = utf8_table(&[
            ("student_id", &[Some("sid-1"), Some("S-2")]),
            ("first_name", &[Some("maria2001-05-02"), Some("bo")]),
            ("last_name", &[Some("lopez"), Some("chan")]),
            ("DOB", &[Some("1999-01-01"), Some("bad date")]),
            ("ELL_Status", &[Some("Yes"), Some("maybe")]),
            ("notes", &[Some("behavior_flag=true\\"), Some("NULL")]),
        ]);
        let grades = utf8_table(&[
            ("student_id", &[Some("SID-1"), Some("sid-1")]),
            ("entry_id", &[Some("e1"), Some("e2")]),
            ("grade", &[Some("B+"), Some("XYZ")]),
            ("credits_earned", &[Some("3\\"), Some("4")]),
        ]);
        let attendance = utf8_table(&[
            ("student_id", &[Some("s-1"), Some("S-1"), Some("s-1")]),
            ("record_id", &[Some("r1"), Some("r2"), Some("r3")]),
            ("date", &[Some("0250903"), Some("20250904"), Some("20250905-20250906")]),
            ("attendance_status", &[Some("Present"), Some("Absent"), Some("Present\\")]),
        ]);
        (demographics, grades, attendance)
    }

    #[test]
    fn full_run_publishes_expected_cardinality() {
        let (demographics, grades, attendance) = fixtures();
        let sink = CaptureSink::new();
        let report = run_tables(
            &demographics,
            &grades,
            &attendance,
            &config(),
            &sink,
            &NoopAggregation,
        )
        .unwrap();

        // student 1: 2 grades x 3 attendance = 6 rows; student 2: 1 row
        assert_eq!(report.unified_rows, 7);
        assert!(report.quality.quality_passed);
        assert_eq!(report.cleaning.demographics.names_repaired, 1);
        assert_eq!(report.cleaning.grades.unknown_grades, 1);
        assert_eq!(report.destination, "raw_student_data.cleaned_student_data");

        let published = sink.published.borrow();
        let (batch, dest) = published.as_ref().unwrap();
        assert_eq!(dest, "raw_student_data.cleaned_student_data");
        assert_eq!(batch.num_rows(), 7);
        // every published column name is sink-safe
        for field in batch.schema().fields() {
            assert!(
                field
                    .name()
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_'),
                "unsanitized column {:?}",
                field.name()
            );
        }
    }

    #[test]
    fn aggregation_failure_terminates_the_run() {
        let (demographics, grades, attendance) = fixtures();
        let sink = CaptureSink::new();
        let err = run_tables(
            &demographics,
            &grades,
            &attendance,
            &config(),
            &sink,
            &FailingAggregation,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Query(_)));
        // the sink had already been written; the run is still terminated
        assert!(sink.published.borrow().is_some());
    }
}
