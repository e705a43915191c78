//! Error types for the ingestion pipeline

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`RecordStore`](crate::store::RecordStore) backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The backend refused the operation without a driver error
    #[error("Store rejected operation: {0}")]
    Rejected(String),
}

/// Fatal outcomes of an ingestion run.
///
/// Per-entry problems are not errors; they become skip counts.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Malformed document at byte {position}: {detail}")]
    MalformedDocument { position: u64, detail: String },

    #[error("Batch commit failed after {records_committed} committed records: {source}")]
    CommitFailure {
        records_committed: u64,
        #[source]
        source: StoreError,
    },

    #[error("Ingestion timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn malformed(position: u64, detail: impl Into<String>) -> Self {
        Self::MalformedDocument {
            position,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::BadRequest(_) => FailureKind::BadRequest,
            IngestError::MalformedDocument { .. } => FailureKind::MalformedDocument,
            IngestError::CommitFailure { .. } => FailureKind::CommitFailure,
            IngestError::Timeout(_) => FailureKind::Timeout,
            IngestError::Io(_) => FailureKind::Io,
        }
    }
}

/// Coarse classification handed to callers (HTTP layer, CLI exit codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    BadRequest,
    MalformedDocument,
    CommitFailure,
    Timeout,
    Io,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::BadRequest => "bad_request",
            FailureKind::MalformedDocument => "malformed_document",
            FailureKind::CommitFailure => "commit_failure",
            FailureKind::Timeout => "timeout",
            FailureKind::Io => "io",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run as reported to the caller.
///
/// `records_ingested_before_failure` counts records from batches that were
/// durably committed before the run failed; they stay in the store.
#[derive(Error, Debug)]
#[error("{error} ({records_ingested_before_failure} records ingested before failure)")]
pub struct IngestFailure {
    #[source]
    pub error: IngestError,
    pub records_ingested_before_failure: u64,
}

impl IngestFailure {
    pub fn new(error: IngestError, records_ingested_before_failure: u64) -> Self {
        Self {
            error,
            records_ingested_before_failure,
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

impl From<IngestError> for IngestFailure {
    fn from(error: IngestError) -> Self {
        let committed = match &error {
            IngestError::CommitFailure {
                records_committed, ..
            } => *records_committed,
            _ => 0,
        };
        Self::new(error, committed)
    }
}
