use anyhow::Result;
use clap::Parser;
use edupipe::features::{SqlScriptAggregation, DEFAULT_FAILURE_CUTOFF, FEATURE_VIEW};
use edupipe::pipeline::{self, PipelineConfig};
use edupipe::sink::{ParquetSink, WriteMode};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "edupipe", about = "Student records ETL pipeline")]
struct Args {
    /// Directory containing the three input CSV exports
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory the Parquet output and view script are written to
    #[arg(long, default_value = "warehouse")]
    out_dir: PathBuf,

    /// Warehouse dataset name for the published table and view
    #[arg(long, default_value = "raw_student_data")]
    dataset: String,

    /// Grades below this numeric value count as course failures
    #[arg(long, default_value_t = DEFAULT_FAILURE_CUTOFF)]
    failure_cutoff: f64,

    /// Append to the published table instead of replacing it
    #[arg(long)]
    append: bool,
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
    info!("startup");

    let args = Args::parse();
    fs::create_dir_all(&args.out_dir)?;

    // ─── 2) wire collaborators ───────────────────────────────────────
    let sink = ParquetSink::new(&args.out_dir);
    let aggregation = SqlScriptAggregation::new(
        &args.dataset,
        args.out_dir.join(format!("{FEATURE_VIEW}.sql")),
    );
    let config = PipelineConfig {
        data_dir: args.data_dir,
        dataset: args.dataset,
        failure_cutoff: args.failure_cutoff,
        mode: if args.append {
            WriteMode::Append
        } else {
            WriteMode::Replace
        },
    };

    // ─── 3) run ──────────────────────────────────────────────────────
    match pipeline::run(&config, &sink, &aggregation) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!("pipeline terminated: {e}");
            Err(e.into())
        }
    }
}
