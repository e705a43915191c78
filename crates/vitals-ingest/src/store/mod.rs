//! Relational store capability used by the batch committer
//!
//! A store hands out one [`BatchTransaction`] per batch. Everything written
//! through a batch becomes visible on [`commit`](BatchTransaction::commit)
//! and disappears on [`rollback`](BatchTransaction::rollback) or when the
//! batch is dropped without either.

pub mod postgres;
pub mod schema;
pub mod sqlite;

pub use postgres::PgStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StoreError;
use crate::model::{MetadataEntry, Record, RecordId};

/// Metadata rows per multi-row insert. Three bound parameters per row keeps
/// a chunk well under the SQLite and PostgreSQL parameter limits.
pub const METADATA_CHUNK_SIZE: usize = 500;

#[async_trait]
pub trait RecordStore: Send + Sync {
    type Batch: BatchTransaction;

    /// Open a new atomic unit of work
    async fn begin_batch(&self) -> Result<Self::Batch, StoreError>;
}

#[async_trait]
pub trait BatchTransaction: Send + Sized {
    /// Insert a record and return the identifier the store assigned to it
    async fn insert_record(&mut self, record: &Record) -> Result<RecordId, StoreError>;

    async fn insert_metadata_entries(&mut self, entries: &[MetadataEntry])
        -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Row counts of both tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub records: u64,
    pub metadata_entries: u64,
}
