//! `vitals count` command implementation

use anyhow::Result;
use vitals_ingest::store::StoreCounts;

use super::{database_config, Backend};

/// Print record and metadata row counts as JSON
pub async fn run(database_url: Option<&str>) -> Result<StoreCounts> {
    let config = database_config(database_url)?;
    let backend = Backend::connect(&config).await?;
    let counts = backend.counts().await?;

    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(counts)
}
