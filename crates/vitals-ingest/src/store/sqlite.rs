//! SQLite backend

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::schema::SQLITE_SCHEMA;
use super::{BatchTransaction, RecordStore, StoreCounts, METADATA_CHUNK_SIZE};
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::model::{MetadataEntry, Record, RecordId};

/// Store backed by a SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect, creating the database file if it does not exist
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await?;

        info!(
            max_connections = config.max_connections,
            "SQLite connection pool created"
        );

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for statement in SQLITE_SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        let metadata_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM record_metadata")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreCounts {
            records: records.max(0) as u64,
            metadata_entries: metadata_entries.max(0) as u64,
        })
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    type Batch = SqliteBatch;

    async fn begin_batch(&self) -> Result<SqliteBatch, StoreError> {
        Ok(SqliteBatch {
            tx: self.pool.begin().await?,
        })
    }
}

/// One open SQLite transaction
pub struct SqliteBatch {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl BatchTransaction for SqliteBatch {
    async fn insert_record(&mut self, record: &Record) -> Result<RecordId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO records (
                type, unit, value, source_name, source_version, device,
                creation_date, start_date, end_date
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING id
            "#,
        )
        .bind(&record.record_type)
        .bind(&record.unit)
        .bind(&record.value)
        .bind(&record.source_name)
        .bind(&record.source_version)
        .bind(&record.device)
        .bind(record.creation_date.map(|ts| ts.with_timezone(&Utc)))
        .bind(record.start_date.with_timezone(&Utc))
        .bind(record.end_date.map(|ts| ts.with_timezone(&Utc)))
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(RecordId(id))
    }

    async fn insert_metadata_entries(
        &mut self,
        entries: &[MetadataEntry],
    ) -> Result<(), StoreError> {
        for chunk in entries.chunks(METADATA_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO record_metadata (record_id, key, value) ");

            query_builder.push_values(chunk, |mut b, entry| {
                b.push_bind(entry.record_id().0)
                    .push_bind(entry.key())
                    .push_bind(entry.value());
            });

            query_builder.build().execute(&mut *self.tx).await?;
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::Annotation;
    use crate::translator::parse_timestamp;

    async fn memory_store() -> SqliteStore {
        // One connection so every query sees the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteStore::from_pool(pool);
        store.ensure_schema().await.unwrap();
        store
    }

    fn record(record_type: &str) -> Record {
        Record {
            record_type: record_type.to_string(),
            unit: Some("count".to_string()),
            value: Some("12".to_string()),
            source_name: None,
            source_version: None,
            device: None,
            creation_date: None,
            start_date: parse_timestamp("2024-01-01 10:00:00 +0200").unwrap(),
            end_date: None,
        }
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let store = memory_store().await;
        store.ensure_schema().await.unwrap();
        assert_eq!(store.counts().await.unwrap(), StoreCounts::default());
    }

    #[tokio::test]
    async fn test_committed_batch_is_visible() {
        let store = memory_store().await;

        let mut batch = store.begin_batch().await.unwrap();
        let first = batch.insert_record(&record("A")).await.unwrap();
        let second = batch.insert_record(&record("B")).await.unwrap();
        assert_ne!(first, second);

        let rows = vec![
            Annotation::new("k1", "v1").attach(first),
            Annotation::new("k2", "v2").attach(second),
        ];
        batch.insert_metadata_entries(&rows).await.unwrap();
        batch.commit().await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.records, 2);
        assert_eq!(counts.metadata_entries, 2);
    }

    #[tokio::test]
    async fn test_rolled_back_batch_leaves_nothing() {
        let store = memory_store().await;

        let mut batch = store.begin_batch().await.unwrap();
        let id = batch.insert_record(&record("A")).await.unwrap();
        batch
            .insert_metadata_entries(&[Annotation::new("k", "v").attach(id)])
            .await
            .unwrap();
        batch.rollback().await.unwrap();

        assert_eq!(store.counts().await.unwrap(), StoreCounts::default());
    }

    #[tokio::test]
    async fn test_start_date_stored_as_utc() {
        let store = memory_store().await;

        let mut batch = store.begin_batch().await.unwrap();
        batch.insert_record(&record("A")).await.unwrap();
        batch.commit().await.unwrap();

        let stored: chrono::DateTime<Utc> =
            sqlx::query_scalar("SELECT start_date FROM records")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(stored.to_rfc3339(), "2024-01-01T08:00:00+00:00");
    }

    #[tokio::test]
    async fn test_metadata_inserts_span_chunks() {
        let store = memory_store().await;

        let mut batch = store.begin_batch().await.unwrap();
        let id = batch.insert_record(&record("A")).await.unwrap();
        let rows: Vec<_> = (0..METADATA_CHUNK_SIZE + 7)
            .map(|i| Annotation::new(format!("k{i}"), "v").attach(id))
            .collect();
        batch.insert_metadata_entries(&rows).await.unwrap();
        batch.commit().await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.metadata_entries, (METADATA_CHUNK_SIZE + 7) as u64);
    }
}
