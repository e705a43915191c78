//! Full runs against a SQLite database file

mod common;

use chrono::{DateTime, Utc};
use common::{export, init_test_tracing, record_xml, valid_export, START};
use tempfile::TempDir;
use vitals_ingest::config::{DatabaseConfig, IngestConfig};
use vitals_ingest::store::SqliteStore;
use vitals_ingest::{FailureKind, Ingestor};

async fn sqlite_store(dir: &TempDir) -> SqliteStore {
    init_test_tracing();
    let url = format!("sqlite://{}", dir.path().join("vitals.db").display());
    let config = DatabaseConfig::default().with_url(url);
    let store = SqliteStore::connect(&config).await.unwrap();
    store.ensure_schema().await.unwrap();
    store
}

#[tokio::test]
async fn test_export_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    let config = IngestConfig::new()
        .with_batch_size(3)
        .with_staging_dir(dir.path().join("staging"));
    let ingestor = Ingestor::new(store.clone(), config);

    let xml = export([
        format!(
            r#"<Record type="HKQuantityTypeIdentifierHeartRate" sourceName="Anna&apos;s Watch" sourceVersion="10.1" device="&lt;&lt;HKDevice&gt;&gt;" unit="count/min" creationDate="2024-01-01 10:01:00 +0100" startDate="2024-01-01 10:00:00 +0100" endDate="garbage" value="72">
                 <MetadataEntry key="HKMetadataKeyHeartRateMotionContext" value="1"/>
                 <HeartRateVariabilityMetadataList>
                   <InstantaneousBeatsPerMinute bpm="61" time="9:42:13.44 PM"/>
                 </HeartRateVariabilityMetadataList>
               </Record>"#
        ),
        record_xml(1, 2),
        record_xml(2, 0),
        record_xml(3, 1),
        r#"<Record type="HKQuantityTypeIdentifierStepCount" startDate="1st of May"/>"#.to_string(),
    ]);

    let summary = ingestor.ingest(xml.as_bytes(), "export.xml").await.unwrap();
    assert_eq!(summary.records_ingested, 4);
    assert_eq!(summary.records_skipped, 1);
    assert_eq!(summary.metadata_ingested, 4);
    assert_eq!(summary.batches_committed, 2);

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.records, 4);
    assert_eq!(counts.metadata_entries, 4);

    let (source_name, device, start_date, end_date): (
        String,
        String,
        DateTime<Utc>,
        Option<DateTime<Utc>>,
    ) = sqlx::query_as(
        "SELECT source_name, device, start_date, end_date FROM records WHERE type = 'HKQuantityTypeIdentifierHeartRate'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(source_name, "Anna's Watch");
    assert_eq!(device, "<<HKDevice>>");
    assert_eq!(start_date.to_rfc3339(), "2024-01-01T09:00:00+00:00");
    assert!(end_date.is_none());

    assert_eq!(
        std::fs::read_dir(dir.path().join("staging")).unwrap().count(),
        0
    );
}

#[tokio::test]
async fn test_deleting_record_cascades_to_metadata() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    let ingestor = Ingestor::new(
        store.clone(),
        IngestConfig::new().with_staging_dir(dir.path()),
    );

    ingestor
        .ingest(valid_export(2, 3).as_bytes(), "export.xml")
        .await
        .unwrap();
    assert_eq!(store.counts().await.unwrap().metadata_entries, 6);

    sqlx::query("DELETE FROM records WHERE value = '0'")
        .execute(store.pool())
        .await
        .unwrap();

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.records, 1);
    assert_eq!(counts.metadata_entries, 3);
}

#[tokio::test]
async fn test_failed_run_keeps_earlier_batches_only() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    let ingestor = Ingestor::new(
        store.clone(),
        IngestConfig::new()
            .with_batch_size(5)
            .with_staging_dir(dir.path()),
    );

    // Second root element is never closed
    let mut xml = valid_export(8, 1);
    xml.push_str("<Trailing>");
    let failure = ingestor.ingest(xml.as_bytes(), "export.xml").await.unwrap_err();

    assert_eq!(failure.kind(), FailureKind::MalformedDocument);
    assert_eq!(failure.records_ingested_before_failure, 5);
    let counts = store.counts().await.unwrap();
    assert_eq!(counts.records, 5);
    assert_eq!(counts.metadata_entries, 5);
}

#[tokio::test]
async fn test_runs_append() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    let ingestor = Ingestor::new(store.clone(), IngestConfig::new().with_staging_dir(dir.path()));

    let xml = export([format!(r#"<Record type="A" startDate="{START}"/>"#)]);
    ingestor.ingest(xml.as_bytes(), "a.xml").await.unwrap();
    ingestor.ingest(xml.as_bytes(), "b.xml").await.unwrap();

    assert_eq!(store.counts().await.unwrap().records, 2);
}
