// src/ingest/mod.rs
//
// Table Loader collaborator: flat CSV -> all-Utf8 RecordBatch. Type
// inference is deliberately skipped; every value arrives as raw text and
// the cleaners decide what it really is.

use arrow::compute::concat_batches;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as CSV: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ArrowError,
    },
    #[error("{path} has no header row")]
    MissingHeader { path: PathBuf },
}

/// Trim and strip one layer of surrounding quotes from a header cell.
fn clean_header(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Load a CSV file into a single batch with every column as nullable Utf8.
pub fn load_csv(path: &Path) -> Result<RecordBatch, LoadError> {
    info!(path = %path.display(), "loading data");

    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let header_line = content.lines().next().ok_or_else(|| LoadError::MissingHeader {
        path: path.to_path_buf(),
    })?;
    let fields: Vec<Field> = header_line
        .split(',')
        .map(|h| Field::new(clean_header(h), DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let parse = |source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(8_192)
        .build(Cursor::new(content.as_bytes()))
        .map_err(parse)?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(parse)?;

    let batch = if batches.is_empty() {
        RecordBatch::new_empty(schema)
    } else {
        concat_batches(&schema, &batches).map_err(parse)?
    };

    info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        "loaded data shape"
    );
    Ok(batch)
}
