//! Staging of uploads on local disk
//!
//! The staged copy is a [`NamedTempFile`], so it is removed when dropped on
//! any exit path, including cancellation.

use std::fs::File;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::IngestError;

const STAGED_PREFIX: &str = "vitals-upload-";
const STAGED_SUFFIX: &str = ".xml";

#[derive(Debug)]
pub struct StagedInput {
    file: NamedTempFile,
    bytes: u64,
}

impl StagedInput {
    /// Copy `input` into a fresh file under `dir`
    pub async fn stage<R>(mut input: R, dir: &Path) -> Result<Self, IngestError>
    where
        R: AsyncRead + Unpin,
    {
        tokio::fs::create_dir_all(dir).await?;

        let target = dir.to_path_buf();
        let (file, writer) = tokio::task::spawn_blocking(move || create_staged_file(&target))
            .await
            .map_err(std::io::Error::other)??;

        let mut writer = tokio::fs::File::from_std(writer);
        let bytes = tokio::io::copy(&mut input, &mut writer).await?;
        writer.flush().await?;

        debug!(path = %file.path().display(), bytes, "Staged upload");
        Ok(Self { file, bytes })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Remove the staged file now. Failures are logged, not returned.
    pub fn cleanup(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!(path = %path.display(), "Removed staged upload"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staged upload"),
        }
    }
}

/// Blocking half of staging: the named file plus a second handle to write through
fn create_staged_file(dir: &Path) -> std::io::Result<(NamedTempFile, File)> {
    let file = tempfile::Builder::new()
        .prefix(STAGED_PREFIX)
        .suffix(STAGED_SUFFIX)
        .tempfile_in(dir)?;
    let writer = file.reopen()?;
    Ok((file, writer))
}
