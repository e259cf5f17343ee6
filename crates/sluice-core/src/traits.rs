use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, StagingError};
use crate::models::{Extracted, StagedArtifact};

/// Durably materializes a batch of records as one named artifact.
#[async_trait]
pub trait StagingSink: Send + Sync {
    /// Write `records` for `dataset` and return where they landed.
    ///
    /// Records keep their order. The artifact never appears under its final
    /// name until it is complete.
    async fn write(
        &self,
        dataset: &str,
        records: Vec<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<StagedArtifact, StagingError>;
}

/// Pulls records for one dataset from one source.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Dataset name this extractor produces.
    fn name(&self) -> &str;

    /// Read the source and, if it yielded records, stage them through `sink`.
    async fn extract(
        &self,
        sink: &dyn StagingSink,
        cancel: &CancellationToken,
    ) -> Result<Extracted, AppError>;
}

/// Serialize typed records to field-tagged values and stage them.
pub async fn stage_records<T: Serialize>(
    sink: &dyn StagingSink,
    dataset: &str,
    records: &[T],
    cancel: &CancellationToken,
) -> Result<StagedArtifact, AppError> {
    let values = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sink.write(dataset, values, cancel).await?)
}

/// Supplies the scheduler's sleep interval, read once per sleep.
pub trait IntervalSource: Send + Sync {
    fn interval(&self) -> Duration;
}

impl IntervalSource for Duration {
    fn interval(&self) -> Duration {
        *self
    }
}

/// Hot-reloadable interval: whatever was last published on the channel.
impl IntervalSource for watch::Receiver<Duration> {
    fn interval(&self) -> Duration {
        *self.borrow()
    }
}
