//! Shared helpers for vitals-ingest integration tests
//!
//! - [`RecordingStore`]: in-memory store that records every batch and can be
//!   told to fail or stall at a given batch
//! - document builders for synthetic health exports

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vitals_ingest::model::{MetadataEntry, Record, RecordId};
use vitals_ingest::store::{BatchTransaction, RecordStore};
use vitals_ingest::StoreError;

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vitals_ingest=debug,sqlx=warn")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Recording Store
// ============================================================================

/// Where an injected failure happens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// `insert_record` fails for the n-th record of the given batch (1-based)
    InsertRecord { batch: u64, record: usize },
    /// `insert_metadata_entries` fails in the given batch
    InsertMetadata { batch: u64 },
    /// `commit` fails for the given batch
    Commit { batch: u64 },
}

#[derive(Debug, Default)]
pub struct StoreState {
    next_id: i64,
    pub batches_begun: u64,
    pub rollbacks: u64,
    /// Record count of each committed batch, in commit order
    pub commits: Vec<usize>,
    pub records: Vec<(RecordId, Record)>,
    pub metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    state: Arc<Mutex<StoreState>>,
    fail_at: Option<FailPoint>,
    insert_delay: Option<Duration>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(mut self, point: FailPoint) -> Self {
        self.fail_at = Some(point);
        self
    }

    /// Sleep before every record insert
    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    pub fn committed_types(&self) -> Vec<String> {
        self.state()
            .records
            .iter()
            .map(|(_, r)| r.record_type.clone())
            .collect()
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    type Batch = RecordingBatch;

    async fn begin_batch(&self) -> Result<RecordingBatch, StoreError> {
        let number = {
            let mut state = self.state();
            state.batches_begun += 1;
            state.batches_begun
        };
        Ok(RecordingBatch {
            state: Arc::clone(&self.state),
            number,
            fail_at: self.fail_at,
            insert_delay: self.insert_delay,
            records: Vec::new(),
            metadata: Vec::new(),
        })
    }
}

pub struct RecordingBatch {
    state: Arc<Mutex<StoreState>>,
    number: u64,
    fail_at: Option<FailPoint>,
    insert_delay: Option<Duration>,
    records: Vec<(RecordId, Record)>,
    metadata: Vec<MetadataEntry>,
}

impl RecordingBatch {
    fn injected(&self, what: &str) -> StoreError {
        StoreError::Rejected(format!("injected {what} failure in batch {}", self.number))
    }
}

#[async_trait]
impl BatchTransaction for RecordingBatch {
    async fn insert_record(&mut self, record: &Record) -> Result<RecordId, StoreError> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(FailPoint::InsertRecord { batch, record: n }) = self.fail_at {
            if batch == self.number && n == self.records.len() + 1 {
                return Err(self.injected("insert"));
            }
        }

        let id = {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            RecordId(state.next_id)
        };
        self.records.push((id, record.clone()));
        Ok(id)
    }

    async fn insert_metadata_entries(
        &mut self,
        entries: &[MetadataEntry],
    ) -> Result<(), StoreError> {
        if self.fail_at == Some(FailPoint::InsertMetadata { batch: self.number }) {
            return Err(self.injected("metadata"));
        }
        for entry in entries {
            assert!(
                self.records.iter().any(|(id, _)| *id == entry.record_id()),
                "metadata row for unknown record {}",
                entry.record_id()
            );
        }
        self.metadata.extend_from_slice(entries);
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        if self.fail_at == Some(FailPoint::Commit { batch: self.number }) {
            self.state.lock().unwrap().rollbacks += 1;
            return Err(self.injected("commit"));
        }
        let mut state = self.state.lock().unwrap();
        state.commits.push(self.records.len());
        state.records.extend(self.records);
        state.metadata.extend(self.metadata);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

// ============================================================================
// Documents
// ============================================================================

pub const START: &str = "2024-01-01 10:00:00 +0000";

/// A valid `Record` element with `meta` annotations
pub fn record_xml(n: usize, meta: usize) -> String {
    let mut xml = format!(
        r#"<Record type="HKQuantityTypeIdentifierStepCount" sourceName="Phone" unit="count" value="{n}" startDate="{START}" endDate="2024-01-01 10:05:00 +0000""#
    );
    if meta == 0 {
        xml.push_str("/>");
        return xml;
    }
    xml.push('>');
    for i in 0..meta {
        xml.push_str(&format!(r#"<MetadataEntry key="k{i}" value="{n}-{i}"/>"#));
    }
    xml.push_str("</Record>");
    xml
}

/// Wrap entries in an export root
pub fn export(entries: impl IntoIterator<Item = String>) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<HealthData locale=\"en_US\">\n");
    xml.push_str("<ExportDate value=\"2024-05-01 09:00:00 +0200\"/>\n");
    for entry in entries {
        xml.push_str(&entry);
        xml.push('\n');
    }
    xml.push_str("</HealthData>\n");
    xml
}

/// `count` valid entries with `meta` annotations each
pub fn valid_export(count: usize, meta: usize) -> String {
    export((0..count).map(|n| record_xml(n, meta)))
}

/// Number of files left in a staging directory
pub fn staged_files(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}
