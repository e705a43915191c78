//! PostgreSQL backend

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::info;

use super::schema::POSTGRES_SCHEMA;
use super::{BatchTransaction, RecordStore, StoreCounts, METADATA_CHUNK_SIZE};
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::model::{MetadataEntry, Record, RecordId};

#[derive(Debug, Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Database connection pool created"
        );

        Ok(Self { db })
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &PgPool {
        &self.db
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;
        for statement in POSTGRES_SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let (records, metadata_entries): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM records),
                (SELECT COUNT(*) FROM record_metadata)
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(StoreCounts {
            records: records.max(0) as u64,
            metadata_entries: metadata_entries.max(0) as u64,
        })
    }
}

#[async_trait]
impl RecordStore for PgStore {
    type Batch = PgBatch;

    async fn begin_batch(&self) -> Result<PgBatch, StoreError> {
        Ok(PgBatch {
            tx: self.db.begin().await?,
        })
    }
}

pub struct PgBatch {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BatchTransaction for PgBatch {
    async fn insert_record(&mut self, record: &Record) -> Result<RecordId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO records (
                type,
                unit,
                value,
                source_name,
                source_version,
                device,
                creation_date,
                start_date,
                end_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO record_metadata (
                    record_id,
                    key,
                    value
                )
                "#,
            );

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
