//! `vitals init-db` command implementation

use anyhow::Result;
use tracing::info;

use super::{database_config, Backend};

/// Create the tables if they are missing
pub async fn run(database_url: Option<&str>) -> Result<()> {
    let config = database_config(database_url)?;
    let backend = Backend::connect(&config).await?;
    backend.ensure_schema().await?;

    info!("Schema ready");
    Ok(())
}
