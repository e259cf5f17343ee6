//! File-system staging sink.
//!
//! Every write produces one JSON artifact named
//! `{dataset}_{yyyyMMddHHmmssfff}.json` inside the staging directory. The
//! records are serialized into a hidden temporary file in that same
//! directory, flushed to disk, and only then linked under the final name, so
//! readers never observe a half-written artifact. The final name is claimed
//! without clobbering; if another write already owns it, a numeric suffix is
//! appended. Concurrent extractors therefore never overwrite each other and
//! no lock is needed.

use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use crate::config::StagingConfig;
use crate::error::StagingError;
use crate::models::StagedArtifact;
use crate::traits::StagingSink;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// Upper bound on suffixed names tried for one timestamp.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes staged artifacts as JSON files under a base directory.
#[derive(Debug, Clone)]
pub struct FileStagingSink {
    base_path: PathBuf,
}

impl FileStagingSink {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn from_config(config: &StagingConfig) -> Self {
        Self::new(config.base_path.clone())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl StagingSink for FileStagingSink {
    async fn write(
        &self,
        dataset: &str,
        records: Vec<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<StagedArtifact, StagingError> {
        validate_dataset(dataset)?;
        if cancel.is_cancelled() {
            return Err(StagingError::Cancelled);
        }

        let staged_at = Utc::now();
        let record_count = records.len();
        let dir = self.base_path.clone();
        let name = dataset.to_string();
        let token = cancel.clone();

        let location = tokio::task::spawn_blocking(move || {
            write_atomically(&dir, &name, staged_at, &records, &token)
        })
        .await
        .map_err(|e| StagingError::io(&self.base_path, std::io::Error::other(e)))??;

        tracing::info!(
            dataset,
            records = record_count,
            path = %location.display(),
            "Staged records"
        );

        Ok(StagedArtifact {
            dataset: dataset.to_string(),
            location,
            record_count,
            staged_at,
        })
    }
}

/// Reject names that are empty or could escape the staging directory.
fn validate_dataset(dataset: &str) -> Result<(), StagingError> {
    let invalid = dataset.trim().is_empty()
        || dataset == "."
        || dataset.contains("..")
        || dataset.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StagingError::InvalidDataset(dataset.to_string()));
    }
    Ok(())
}

fn artifact_file_name(dataset: &str, staged_at: DateTime<Utc>, attempt: u32) -> String {
    let timestamp = staged_at.format(TIMESTAMP_FORMAT);
    if attempt == 0 {
        format!("{dataset}_{timestamp}.json")
    } else {
        format!("{dataset}_{timestamp}_{attempt}.json")
    }
}

fn write_atomically(
    dir: &Path,
    dataset: &str,
    staged_at: DateTime<Utc>,
    records: &[serde_json::Value],
    cancel: &CancellationToken,
) -> Result<PathBuf, StagingError> {
    std::fs::create_dir_all(dir).map_err(|e| StagingError::io(dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| StagingError::io(dir, e))?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.flush().map_err(|e| StagingError::io(dir, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| StagingError::io(dir, e))?;

    // Dropping `tmp` removes the temporary file.
    if cancel.is_cancelled() {
        return Err(StagingError::Cancelled);
    }

    let location = persist_unique(tmp, dir, dataset, staged_at)?;
    sync_dir(dir);
    Ok(location)
}

fn persist_unique(
    mut tmp: NamedTempFile,
    dir: &Path,
    dataset: &str,
    staged_at: DateTime<Utc>,
) -> Result<PathBuf, StagingError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(artifact_file_name(dataset, staged_at, attempt));
        match tmp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => tmp = e.file,
            Err(e) => return Err(StagingError::io(path, e.error)),
        }
    }
    Err(StagingError::io(
        dir,
        std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free artifact name for dataset '{dataset}'"),
        ),
    ))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = std::fs::File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), error = %e, "Directory sync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
