//! Table definitions for both backends
//!
//! Creation is idempotent; there is no migration history.

pub const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        unit TEXT,
        value TEXT,
        source_name TEXT,
        source_version TEXT,
        device TEXT,
        creation_date TEXT,
        start_date TEXT NOT NULL,
        end_date TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS record_metadata (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
        key TEXT NOT NULL,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_record_metadata_record_id
        ON record_metadata(record_id)
    "#,
];

pub const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS records (
        id BIGSERIAL PRIMARY KEY,
        type VARCHAR NOT NULL,
        unit VARCHAR,
        value VARCHAR,
        source_name VARCHAR,
        source_version VARCHAR,
        device VARCHAR,
        creation_date TIMESTAMPTZ,
        start_date TIMESTAMPTZ NOT NULL,
        end_date TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS record_metadata (
        id BIGSERIAL PRIMARY KEY,
        record_id BIGINT NOT NULL REFERENCES records(id) ON DELETE CASCADE,
        key VARCHAR NOT NULL,
        value VARCHAR NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_record_metadata_record_id
        ON record_metadata(record_id)
    "#,
];
