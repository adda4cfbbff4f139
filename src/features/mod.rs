// src/features/mod.rs
//
// Aggregation Service collaborator: the per-student feature view derived
// from the published unified table. Rendering the statement is pure and
// tested here; executing it against a warehouse stays behind the trait.

use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Grades below this numeric value count as course failures.
pub const DEFAULT_FAILURE_CUTOFF: f64 = 65.0;
/// Table the unified pipeline output is published to.
pub const UNIFIED_TABLE: &str = "cleaned_student_data";
/// Name of the derived aggregate view.
pub const FEATURE_VIEW: &str = "student_features";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to materialize feature view: {0}")]
    Execution(#[source] anyhow::Error),
}

pub trait AggregationService {
    /// Create or refresh the feature view. The pipeline is not complete
    /// until this succeeds.
    fn refresh_feature_view(&self, failure_cutoff: f64) -> Result<(), QueryError>;
}

/// Render the `CREATE OR REPLACE VIEW` statement for the feature view:
/// per-student credit sum, failure count below the cutoff, present-day
/// ratio, and a boolean OR over the behavior flag encoded in notes.
pub fn feature_view_sql(dataset: &str, failure_cutoff: f64) -> String {
    format!(
        r#"CREATE OR REPLACE VIEW {dataset}.{FEATURE_VIEW} AS
SELECT
  student_id,
  SUM(SAFE_CAST(credits_earned AS FLOAT64)) AS credits_earned_semester,
  COUNTIF(grade_numeric < {failure_cutoff}) AS core_course_failures,
  SAFE_DIVIDE(
    COUNTIF(attendance_status = 'Present'),
    NULLIF(COUNTIF(attendance_status IN ('Present', 'Absent', 'Tardy')), 0)
  ) AS attendance_percentage,
  MAX(CASE WHEN LOWER(notes) LIKE '%behavior_flag=true%' THEN 1 ELSE 0 END) AS behavioral_flag
FROM
  {dataset}.{UNIFIED_TABLE}
GROUP BY
  student_id;
"#
    )
}

/// Writes the rendered view statement to a `.sql` script for the warehouse
/// to execute alongside the published Parquet files.
pub struct SqlScriptAggregation {
    dataset: String,
    out_path: PathBuf,
}

impl SqlScriptAggregation {
    pub fn new(dataset: impl Into<String>, out_path: impl Into<PathBuf>) -> Self {
        Self {
            dataset: dataset.into(),
            out_path: out_path.into(),
        }
    }
}

impl AggregationService for SqlScriptAggregation {
    fn refresh_feature_view(&self, failure_cutoff: f64) -> Result<(), QueryError> {
        let sql = feature_view_sql(&self.dataset, failure_cutoff);
        fs::write(&self.out_path, sql).map_err(|e| {
            QueryError::Execution(anyhow::Error::new(e).context(format!(
                "writing feature view script to {}",
                self.out_path.display()
            )))
        })?;
        info!(path = %self.out_path.display(), "feature view statement materialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rendered_sql_uses_cutoff_and_dataset() {
        let sql = feature_view_sql("raw_student_data", 65.0);
        assert!(sql.contains("CREATE OR REPLACE VIEW raw_student_data.student_features"));
        assert!(sql.contains("grade_numeric < 65"));
        assert!(sql.contains("FROM\n  raw_student_data.cleaned_student_data"));
        assert!(sql.contains("behavior_flag=true"));
    }

    #[test]
    fn script_aggregation_writes_the_statement() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("student_features.sql");
        let agg = SqlScriptAggregation::new("ds", &path);
        agg.refresh_feature_view(70.0).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("grade_numeric < 70"));
    }

    #[test]
    fn unwritable_path_is_a_query_error() {
        let agg = SqlScriptAggregation::new("ds", "/nonexistent/dir/view.sql");
        let err = agg.refresh_feature_view(DEFAULT_FAILURE_CUTOFF).unwrap_err();
        assert!(matches!(err, QueryError::Execution(_)));
    }
}
