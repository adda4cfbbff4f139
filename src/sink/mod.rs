// src/sink/mod.rs
//
// Table Sink collaborator. The warehouse transport itself is external; the
// trait is the seam, and the shipped implementation materializes the table
// as Parquet files laid out by dataset/table so a warehouse can mount them
// as external tables.

use anyhow::Context;
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Replace,
    Append,
}

/// Two-part destination name, `dataset.table`.
#[derive(Debug, Clone)]
pub struct Destination {
    pub dataset: String,
    pub table: String,
}

impl Destination {
    pub fn parse(raw: &str) -> Result<Self, SinkError> {
        match raw.split_once('.') {
            Some((dataset, table)) if !dataset.is_empty() && !table.is_empty() => Ok(Self {
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            _ => Err(SinkError::InvalidDestination(raw.to_string())),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid destination {0:?}: expected dataset.table")]
    InvalidDestination(String),
    #[error("failed to publish to {destination}: {source}")]
    Write {
        destination: String,
        #[source]
        source: anyhow::Error,
    },
}

pub trait TableSink {
    fn publish(
        &self,
        batch: &RecordBatch,
        destination: &Destination,
        mode: WriteMode,
    ) -> Result<(), SinkError>;
}

/// Writes `<root>/<dataset>/<table>.parquet` on Replace, or a timestamped
/// part file under `<root>/<dataset>/<table>/` on Append. Always writes to a
/// temp file first and renames into place.
pub struct ParquetSink {
    root: PathBuf,
}

impl ParquetSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TableSink for ParquetSink {
    fn publish(
        &self,
        batch: &RecordBatch,
        destination: &Destination,
        mode: WriteMode,
    ) -> Result<(), SinkError> {
        let final_path = match mode {
            WriteMode::Replace => self
                .root
                .join(&destination.dataset)
                .join(format!("{}.parquet", destination.table)),
            WriteMode::Append => self
                .root
                .join(&destination.dataset)
                .join(&destination.table)
                .join(format!("part-{}.parquet", Utc::now().timestamp_millis())),
        };
        write_parquet(batch, &final_path).map_err(|source| SinkError::Write {
            destination: destination.to_string(),
            source,
        })?;
        info!(
            rows = batch.num_rows(),
            destination = %destination,
            path = %final_path.display(),
            "published table"
        );
        Ok(())
    }
}

fn write_parquet(batch: &RecordBatch, final_path: &Path) -> anyhow::Result<()> {
    let dir = final_path
        .parent()
        .context("destination path has no parent directory")?;
    fs::create_dir_all(dir).context("creating destination directory")?;

    let tmp_path = final_path.with_extension("parquet.tmp");
    let tmp_file = File::create(&tmp_path).context("creating temporary Parquet file")?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(tmp_file, batch.schema(), Some(props))
        .context("initializing Parquet writer")?;
    writer.write(batch).context("writing batch to Parquet")?;
    writer.close().context("closing Parquet writer")?;

    fs::rename(&tmp_path, final_path).context("renaming Parquet file")?;
    Ok(())
}
