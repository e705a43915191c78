//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod count;
pub mod ingest;
pub mod init_db;

use anyhow::{Context, Result};
use vitals_ingest::config::DatabaseConfig;
use vitals_ingest::store::{PgStore, SqliteStore, StoreCounts};

/// Resolve database settings from the environment, letting `--database-url` win
pub fn database_config(url: Option<&str>) -> Result<DatabaseConfig> {
    let mut config = DatabaseConfig::from_env().context("Invalid database configuration")?;
    if let Some(url) = url {
        config = config.with_url(url);
        config.validate().context("Invalid --database-url")?;
    }
    Ok(config)
}

/// Store selected by the URL scheme
pub enum Backend {
    Sqlite(SqliteStore),
    Postgres(PgStore),
}

impl Backend {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let backend = if config.is_sqlite() {
            Backend::Sqlite(
                SqliteStore::connect(config)
                    .await
                    .context("Failed to open SQLite database")?,
            )
        } else {
            Backend::Postgres(
                PgStore::connect(config)
                    .await
                    .context("Failed to connect to PostgreSQL")?,
            )
        };
        Ok(backend)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        match self {
            Backend::Sqlite(store) => store.ensure_schema().await,
            Backend::Postgres(store) => store.ensure_schema().await,
        }
        .context("Failed to create tables")
    }

    pub async fn counts(&self) -> Result<StoreCounts> {
        match self {
            Backend::Sqlite(store) => store.counts().await,
            Backend::Postgres(store) => store.counts().await,
        }
        .context("Failed to count rows")
    }
}
