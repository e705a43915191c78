//! Batch committer
//!
//! Writes translated entries through a [`RecordStore`] in fixed-size
//! transactions. Each record is inserted before its annotations are turned
//! into metadata rows, so every row carries the id the store just assigned.
//! A batch either commits as a whole or leaves nothing behind.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{IngestError, StoreError};
use crate::model::{MetadataEntry, TranslatedEntry};
use crate::store::{BatchTransaction, RecordStore};

/// Totals over all committed batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    pub records_committed: u64,
    pub metadata_committed: u64,
    pub batches_committed: u64,
}

/// Reported after every successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    /// 1-based
    pub batch_number: u64,
    pub batch_records: u64,
    /// Running total including this batch
    pub records_committed: u64,
}

type ProgressFn<'s> = Box<dyn FnMut(BatchProgress) + Send + 's>;

pub struct BatchCommitter<'s, S: RecordStore> {
    store: &'s S,
    batch_size: usize,
    open: Option<S::Batch>,
    batch_records: usize,
    pending_metadata: Vec<MetadataEntry>,
    stats: CommitStats,
    on_progress: Option<ProgressFn<'s>>,
}

impl<'s, S: RecordStore> BatchCommitter<'s, S> {
    /// `batch_size` of zero is treated as one
    pub fn new(store: &'s S, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            open: None,
            batch_records: 0,
            pending_metadata: Vec::new(),
            stats: CommitStats::default(),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: impl FnMut(BatchProgress) + Send + 's) -> Self {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    pub fn stats(&self) -> CommitStats {
        self.stats
    }

    /// Records in the currently open, uncommitted batch
    pub fn pending_records(&self) -> usize {
        self.batch_records
    }

    /// Add one entry to the open batch, committing it once it is full
    pub async fn push(&mut self, entry: TranslatedEntry) -> Result<(), IngestError> {
        if self.open.is_none() {
            let batch = self
                .store
                .begin_batch()
                .await
                .map_err(|source| self.commit_failure(source))?;
            self.open = Some(batch);
        }

        let inserted = match self.open.as_mut() {
            Some(batch) => batch.insert_record(&entry.record).await,
            None => Err(StoreError::Rejected("no open batch".to_string())),
        };
        let record_id = match inserted {
            Ok(id) => id,
            Err(source) => return Err(self.fail(source).await),
        };

        self.pending_metadata.extend(
            entry
                .annotations
                .into_iter()
                .map(|annotation| annotation.attach(record_id)),
        );
        self.batch_records += 1;

        if self.batch_records >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Commit the final partial batch and return the run totals
    pub async fn finish(&mut self) -> Result<CommitStats, IngestError> {
        self.flush().await?;
        Ok(self.stats)
    }

    /// Roll back the open batch, if any. Earlier batches stay committed.
    pub async fn abandon(&mut self) -> CommitStats {
        let discarded = self.batch_records;
        self.batch_records = 0;
        self.pending_metadata.clear();

        if let Some(batch) = self.open.take() {
            match batch.rollback().await {
                Ok(()) => debug!(discarded, "Rolled back open batch"),
                Err(e) => warn!(discarded, error = %e, "Rollback of open batch failed"),
            }
        }
        self.stats
    }

    async fn flush(&mut self) -> Result<(), IngestError> {
        let Some(mut batch) = self.open.take() else {
            return Ok(());
        };

        let metadata = std::mem::take(&mut self.pending_metadata);
        let inserted = batch.insert_metadata_entries(&metadata).await;
        if let Err(source) = inserted {
            self.open = Some(batch);
            return Err(self.fail(source).await);
        }

        let committed = batch.commit().await;
        if let Err(source) = committed {
            self.batch_records = 0;
            return Err(self.commit_failure(source));
        }

        let batch_records = self.batch_records as u64;
        self.batch_records = 0;
        self.stats.records_committed += batch_records;
        self.stats.metadata_committed += metadata.len() as u64;
        self.stats.batches_committed += 1;

        let progress = BatchProgress {
            batch_number: self.stats.batches_committed,
            batch_records,
            records_committed: self.stats.records_committed,
        };
        info!(
            batch = progress.batch_number,
            records = batch_records,
            metadata = metadata.len(),
            total = progress.records_committed,
            "Committed batch"
        );
        if let Some(on_progress) = self.on_progress.as_mut() {
            on_progress(progress);
        }

        Ok(())
    }

    /// Roll back the open batch and build the error for `source`
    async fn fail(&mut self, source: StoreError) -> IngestError {
        warn!(
            error = %source,
            pending = self.batch_records,
            committed = self.stats.records_committed,
            "Store error, rolling back batch"
        );
        self.abandon().await;
        self.commit_failure(source)
    }

    fn commit_failure(&self, source: StoreError) -> IngestError {
        IngestError::CommitFailure {
            records_committed: self.stats.records_committed,
            source,
        }
    }
}
