//! `vitals ingest` command implementation
//!
//! Loads one export file into the configured store and prints the outcome
//! as JSON.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vitals_ingest::config::IngestConfig;
use vitals_ingest::store::RecordStore;
use vitals_ingest::{check_input_size, FailureKind, IngestFailure, IngestSummary, Ingestor};

use super::{database_config, Backend};

/// Command line overrides on top of `IngestConfig::from_env`
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub batch_size: Option<usize>,
    pub prefetch: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub staging_dir: Option<PathBuf>,
    /// Print a line to stderr after each committed batch
    pub show_progress: bool,
}

impl IngestOptions {
    pub fn apply(&self, mut config: IngestConfig) -> Result<IngestConfig> {
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(prefetch) = self.prefetch {
            config = config.with_prefetch(prefetch);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_run_timeout(Duration::from_secs(secs));
        }
        if let Some(dir) = &self.staging_dir {
            config = config.with_staging_dir(dir);
        }
        config.validate().context("Invalid ingestion options")?;
        Ok(config)
    }
}

/// What `vitals ingest` prints
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestReport {
    Succeeded(IngestSummary),
    Failed {
        kind: FailureKind,
        message: String,
        records_ingested_before_failure: u64,
    },
}

impl IngestReport {
    pub fn exit_code(&self) -> i32 {
        match self {
            IngestReport::Succeeded(_) => 0,
            IngestReport::Failed {
                kind: FailureKind::BadRequest,
                ..
            } => 2,
            IngestReport::Failed { .. } => 1,
        }
    }

    pub fn from_outcome(outcome: Result<IngestSummary, IngestFailure>) -> Self {
        match outcome {
            Ok(summary) => IngestReport::Succeeded(summary),
            Err(failure) => IngestReport::Failed {
                kind: failure.kind(),
                message: failure.error.to_string(),
                records_ingested_before_failure: failure.records_ingested_before_failure,
            },
        }
    }
}

/// Ingest `file`, print the report and return it
pub async fn run(
    file: &Path,
    options: &IngestOptions,
    database_url: Option<&str>,
) -> Result<IngestReport> {
    let base = IngestConfig::from_env().context("Invalid ingestion configuration")?;
    let config = options.apply(base)?;

    let report = match preflight(file, &config).await {
        Some(rejected) => rejected,
        None => {
            let db = database_config(database_url)?;
            let backend = Backend::connect(&db).await?;
            backend.ensure_schema().await?;

            let outcome = match backend {
                Backend::Sqlite(store) => ingest_with(store, config, file, options).await,
                Backend::Postgres(store) => ingest_with(store, config, file, options).await,
            };
            IngestReport::from_outcome(outcome)
        },
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report)
}

/// Size check done before any connection is opened
async fn preflight(file: &Path, config: &IngestConfig) -> Option<IngestReport> {
    let len = match tokio::fs::metadata(file).await {
        Ok(meta) => meta.len(),
        // Missing files are reported by the ingestor itself
        Err(_) => return None,
    };
    check_input_size(len, config)
        .err()
        .map(|error| IngestReport::from_outcome(Err(IngestFailure::from(error))))
}

async fn ingest_with<S: RecordStore>(
    store: S,
    config: IngestConfig,
    file: &Path,
    options: &IngestOptions,
) -> Result<IngestSummary, IngestFailure> {
    let mut ingestor = Ingestor::new(store, config);
    if options.show_progress {
        ingestor = ingestor.with_progress(|progress| {
            eprintln!(
                "batch {}: {} records ({} total)",
                progress.batch_number, progress.batch_records, progress.records_committed
            );
        });
    }
    ingestor.ingest_path(file).await
}
