//! Vitals Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streams health-export XML into a relational store.
//!
//! # Pipeline
//!
//! - **Decoder**: pulls `Record` elements out of the document one at a time
//! - **Translator**: turns each entry into a typed record plus annotations
//! - **Committer**: writes records and their metadata in fixed-size batches
//! - **Orchestrator**: stages the upload and drives one run end to end
//!
//! # Example
//!
//! ```no_run
//! use vitals_ingest::config::{DatabaseConfig, IngestConfig};
//! use vitals_ingest::store::SqliteStore;
//! use vitals_ingest::Ingestor;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = DatabaseConfig::default().with_url("sqlite://vitals.db");
//!     let store = SqliteStore::connect(&db).await?;
//!     store.ensure_schema().await?;
//!
//!     let ingestor = Ingestor::new(store, IngestConfig::from_env()?);
//!     let summary = ingestor.ingest_path("export.xml").await?;
//!     println!("{} records", summary.records_ingested);
//!     Ok(())
//! }
//! ```

pub mod committer;
pub mod config;
pub mod decoder;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod store;
pub mod translator;

pub use committer::{BatchCommitter, BatchProgress, CommitStats};
pub use error::{FailureKind, IngestError, IngestFailure, StoreError};
pub use orchestrator::{check_input_size, IngestSummary, Ingestor, RunPhase};
