//! Vitals CLI Library
//!
//! Command-line shell around the ingestion pipeline:
//!
//! - **Ingestion**: load an export file into the store (`vitals ingest`)
//! - **Counts**: show how many records and metadata rows are stored (`vitals count`)
//! - **Schema**: create the tables if they are missing (`vitals init-db`)

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vitals - health export ingestion
#[derive(Parser, Debug)]
#[command(name = "vitals")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Database URL (postgres://... or sqlite://...); composed from
    /// DATABASE_USER, DATABASE_PASS, DATABASE_HOST, DATABASE_PORT and
    /// DATABASE_NAME when unset
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a health export file
    Ingest {
        /// Export file to read
        file: PathBuf,

        /// Records per committed batch
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Entries decoded ahead of the writer (0 keeps a single task)
        #[arg(short, long)]
        prefetch: Option<usize>,

        /// Abort the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Directory for the staged copy of the upload
        #[arg(long)]
        staging_dir: Option<PathBuf>,
    },

    /// Show record and metadata row counts
    Count,

    /// Create the tables if they do not exist
    InitDb,
}
