//! Ingestion orchestrator
//!
//! Owns one run end to end: validate the request, stage the upload, drive
//! decoder, translator and committer, then remove the staged copy whatever
//! the outcome.

pub mod phase;
pub mod staging;

pub use phase::{PhaseTracker, RunPhase};
pub use staging::StagedInput;

use futures::{Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn, Span};
use uuid::Uuid;

use crate::committer::{BatchCommitter, BatchProgress};
use crate::config::IngestConfig;
use crate::decoder::EntryDecoder;
use crate::error::{IngestError, IngestFailure};
use crate::store::RecordStore;
use crate::translator::{translate, Translation};

/// Skipped entries logged at warn level before switching to debug
const LOUD_SKIPS: u64 = 10;

/// Decoded and translated entry with the byte offset it came from
type Translated = (u64, Translation);

/// Outcome of a successful run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub records_ingested: u64,
    pub records_skipped: u64,
    pub metadata_ingested: u64,
    pub batches_committed: u64,
    pub bytes_staged: u64,
    pub elapsed_ms: u64,
}

/// Caller-side guard for the upload size limit
pub fn check_input_size(len: u64, config: &IngestConfig) -> Result<(), IngestError> {
    if len > config.max_input_size {
        return Err(IngestError::bad_request(format!(
            "input is {len} bytes, limit is {} bytes",
            config.max_input_size
        )));
    }
    Ok(())
}

type SharedProgress = Arc<dyn Fn(BatchProgress) + Send + Sync>;

pub struct Ingestor<S> {
    store: S,
    config: IngestConfig,
    on_progress: Option<SharedProgress>,
}

impl<S: RecordStore> Ingestor<S> {
    pub fn new(store: S, config: IngestConfig) -> Self {
        Self {
            store,
            config,
            on_progress: None,
        }
    }

    /// Called after every committed batch
    pub fn with_progress(mut self, on_progress: impl Fn(BatchProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest a file already on local disk
    pub async fn ingest_path(&self, path: impl AsRef<Path>) -> Result<IngestSummary, IngestFailure> {
        let path = path.as_ref();
        let is_file = tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(IngestError::bad_request(format!("no such file: {}", path.display())).into());
        }

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = tokio::fs::File::open(path).await.map_err(IngestError::from)?;
        self.ingest(file, &filename).await
    }

    /// Run the whole pipeline over `input`.
    ///
    /// Batches committed before a failure stay in the store; the failure
    /// reports how many records they hold.
    #[instrument(skip_all, fields(filename = %filename, run_id = tracing::field::Empty))]
    pub async fn ingest<R>(&self, input: R, filename: &str) -> Result<IngestSummary, IngestFailure>
    where
        R: AsyncRead + Unpin,
    {
        if filename.trim().is_empty() {
            return Err(IngestError::bad_request("filename must not be empty").into());
        }

        let started = Instant::now();
        let run_id = Uuid::new_v4();
        Span::current().record("run_id", tracing::field::display(run_id));

        let mut tracker = PhaseTracker::new(run_id);
        let mut committer = BatchCommitter::new(&self.store, self.config.batch_size);
        if let Some(on_progress) = &self.on_progress {
            let on_progress = Arc::clone(on_progress);
            committer = committer.with_progress(move |progress| on_progress(progress));
        }
        let mut staged = None;
        let mut skipped = 0u64;

        // The deadline covers staging too, so a stalled upload cannot hang the run
        let run = self.stage_and_run(input, &mut staged, &mut committer, &mut tracker, &mut skipped);
        let outcome = match self.config.run_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => Err(IngestError::Timeout(limit)),
            },
            None => run.await,
        };
        let bytes_staged = staged.as_ref().map_or(0, StagedInput::bytes);

        let result = match outcome {
            Ok(()) => {
                tracker.advance(RunPhase::Succeeded);
                let stats = committer.stats();
                Ok(IngestSummary {
                    records_ingested: stats.records_committed,
                    records_skipped: skipped,
                    metadata_ingested: stats.metadata_committed,
                    batches_committed: stats.batches_committed,
                    bytes_staged,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                })
            },
            Err(error) => {
                tracker.advance(RunPhase::for_failure(&error));
                let committed = match &error {
                    // The open transaction is dropped with the committer and
                    // rolled back by the driver; awaiting it here could stall.
                    IngestError::Timeout(_) => committer.stats().records_committed,
                    IngestError::CommitFailure {
                        records_committed, ..
                    } => *records_committed,
                    _ => committer.abandon().await.records_committed,
                };
                Err(IngestFailure::new(error, committed))
            },
        };
        drop(committer);

        tracker.advance(RunPhase::Cleanup);
        // A partly written upload was already removed with the dropped future
        if let Some(staged) = staged {
            staged.cleanup();
        }

        match &result {
            Ok(summary) => info!(
                records = summary.records_ingested,
                skipped = summary.records_skipped,
                metadata = summary.metadata_ingested,
                batches = summary.batches_committed,
                elapsed_ms = summary.elapsed_ms,
                "Ingestion succeeded"
            ),
            Err(failure) => warn!(
                kind = %failure.kind(),
                committed = failure.records_ingested_before_failure,
                error = %failure.error,
                "Ingestion failed"
            ),
        }
        result
    }

    async fn stage_and_run<R>(
        &self,
        input: R,
        staged: &mut Option<StagedInput>,
        committer: &mut BatchCommitter<'_, S>,
        tracker: &mut PhaseTracker,
        skipped: &mut u64,
    ) -> Result<(), IngestError>
    where
        R: AsyncRead + Unpin,
    {
        let staged = staged.insert(StagedInput::stage(input, &self.config.staging_dir()).await?);
        info!(bytes = staged.bytes(), prefetch = self.config.prefetch, "Starting ingestion");
        self.run(staged.path(), committer, tracker, skipped).await
    }

    async fn run(
        &self,
        staged: &Path,
        committer: &mut BatchCommitter<'_, S>,
        tracker: &mut PhaseTracker,
        skipped: &mut u64,
    ) -> Result<(), IngestError> {
        tracker.advance(RunPhase::Streaming);

        if self.config.prefetch == 0 {
            let entries = EntryDecoder::open(staged)
                .await?
                .into_stream()
                .map_ok(|entry| (entry.position, translate(&entry)));
            drain(entries, committer, tracker, skipped).await?;
        } else {
            let (tx, rx) = mpsc::channel(self.config.prefetch);
            let producer = Producer::spawn(staged.to_path_buf(), tx);
            let entries = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            drain(entries, committer, tracker, skipped).await?;
            producer.join().await?;
        }

        tracker.advance(RunPhase::Finalized);
        committer.finish().await?;
        Ok(())
    }
}

/// Push every accepted entry into the committer, counting skips
async fn drain<S, St>(
    entries: St,
    committer: &mut BatchCommitter<'_, S>,
    tracker: &mut PhaseTracker,
    skipped: &mut u64,
) -> Result<(), IngestError>
where
    S: RecordStore,
    St: Stream<Item = Result<Translated, IngestError>>,
{
    futures::pin_mut!(entries);

    while let Some(item) = entries.next().await {
        let (position, translation) = item?;
        match translation {
            Translation::Accepted(entry) => {
                let before = committer.stats().batches_committed;
                committer.push(entry).await?;
                if committer.stats().batches_committed > before {
                    tracker.advance(RunPhase::Committing);
                    tracker.advance(RunPhase::Streaming);
                }
            },
            Translation::Skipped(reason) => {
                *skipped += 1;
                if *skipped <= LOUD_SKIPS {
                    warn!(position, %reason, "Skipping entry");
                } else {
                    debug!(position, %reason, "Skipping entry");
                }
            },
        }
    }
    Ok(())
}

/// Decoder and translator running on their own task, feeding a bounded channel
struct Producer {
    handle: Option<JoinHandle<()>>,
}

impl Producer {
    fn spawn(path: PathBuf, tx: mpsc::Sender<Result<Translated, IngestError>>) -> Self {
        let handle = tokio::spawn(async move {
            let mut decoder = match EntryDecoder::open(&path).await {
                Ok(decoder) => decoder,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                },
            };

            loop {
                let item = match decoder.next_entry().await {
                    Ok(Some(entry)) => Ok((entry.position, translate(&entry))),
                    Ok(None) => return,
                    Err(e) => Err(e),
                };
                let last = item.is_err();
                // A closed channel means the writer gave up
                if tx.send(item).await.is_err() || last {
                    return;
                }
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Wait for the producer to finish; a panic surfaces as an I/O error
    async fn join(mut self) -> Result<(), IngestError> {
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| IngestError::Io(std::io::Error::other(format!("decoder task failed: {e}")))),
            None => Ok(()),
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
