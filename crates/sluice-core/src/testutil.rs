//! Test utilities: mock extractors, sinks and reporters.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, StagingError};
use crate::models::{Extracted, StagedArtifact};
use crate::orchestrator::{CycleEvent, CycleReporter};
use crate::traits::{Extractor, StagingSink, stage_records};

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Behavior {
    Records(Vec<serde_json::Value>),
    Fail(String),
    Panic,
    /// Sleeps without watching the token, then stages.
    Slow(Duration, Vec<serde_json::Value>),
    UntilCancelled,
}

/// Mock extractor with a fixed behaviour per call.
#[derive(Clone)]
pub struct MockExtractor {
    name: String,
    behavior: Behavior,
    calls: Arc<Mutex<Vec<Instant>>>,
    finished: Arc<AtomicUsize>,
}

impl MockExtractor {
    fn with_behavior(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_records(name: &str, records: Vec<serde_json::Value>) -> Self {
        Self::with_behavior(name, Behavior::Records(records))
    }

    pub fn empty(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Records(Vec::new()))
    }

    /// Fails every call with a database error carrying `message`.
    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_behavior(name, Behavior::Fail(message.to_string()))
    }

    pub fn panicking(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Panic)
    }

    pub fn slow(name: &str, delay: Duration, records: Vec<serde_json::Value>) -> Self {
        Self::with_behavior(name, Behavior::Slow(delay, records))
    }

    /// Blocks until the token fires, then reports cancellation.
    pub fn until_cancelled(name: &str) -> Self {
        Self::with_behavior(name, Behavior::UntilCancelled)
    }

    /// Instants at which `extract` was entered.
    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls that ran to their end (success or error).
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    async fn stage(
        &self,
        records: &[serde_json::Value],
        sink: &dyn StagingSink,
        cancel: &CancellationToken,
    ) -> Result<Extracted, AppError> {
        if records.is_empty() {
            return Ok(Extracted::Empty);
        }
        let artifact = stage_records(sink, &self.name, records, cancel).await?;
        Ok(Extracted::Staged(artifact))
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        sink: &dyn StagingSink,
        cancel: &CancellationToken,
    ) -> Result<Extracted, AppError> {
        self.calls.lock().unwrap().push(Instant::now());

        let result = match &self.behavior {
            Behavior::Records(records) => self.stage(records, sink, cancel).await,
            Behavior::Fail(message) => Err(AppError::DatabaseError(message.clone())),
            Behavior::Panic => panic!("mock extractor exploded"),
            Behavior::Slow(delay, records) => {
                tokio::time::sleep(*delay).await;
                self.stage(records, sink, cancel).await
            }
            Behavior::UntilCancelled => {
                cancel.cancelled().await;
                Err(AppError::Cancelled)
            }
        };

        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Recorded write: (dataset, records).
pub type WriteRecord = (String, Vec<serde_json::Value>);

/// In-memory sink that records every write.
#[derive(Clone, Default)]
pub struct MockSink {
    writes: Arc<Mutex<Vec<WriteRecord>>>,
    failing: Arc<HashSet<String>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose destination is unwritable for the given datasets.
    pub fn failing_for(datasets: &[&str]) -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(datasets.iter().map(|d| d.to_string()).collect()),
        }
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().unwrap().clone()
    }

    /// Record batches written for one dataset, in write order.
    pub fn writes_for(&self, dataset: &str) -> Vec<Vec<serde_json::Value>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == dataset)
            .map(|(_, records)| records.clone())
            .collect()
    }
}

#[async_trait]
impl StagingSink for MockSink {
    async fn write(
        &self,
        dataset: &str,
        records: Vec<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<StagedArtifact, StagingError> {
        if cancel.is_cancelled() {
            return Err(StagingError::Cancelled);
        }
        let location = PathBuf::from(format!("memory/{dataset}"));
        if self.failing.contains(dataset) {
            return Err(StagingError::Io {
                path: location,
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }

        let mut writes = self.writes.lock().unwrap();
        let record_count = records.len();
        writes.push((dataset.to_string(), records));
        Ok(StagedArtifact {
            dataset: dataset.to_string(),
            location: location.join(writes.len().to_string()),
            record_count,
            staged_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that keeps a compact label for every event.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events().iter().filter(|e| *e == label).count()
    }
}

impl CycleReporter for RecordingReporter {
    fn report(&self, event: CycleEvent<'_>) {
        let label = match event {
            CycleEvent::CycleStarted { .. } => "cycle_started".to_string(),
            CycleEvent::NoExtractors { .. } => "no_extractors".to_string(),
            CycleEvent::ExtractorStarted { extractor } => format!("started:{extractor}"),
            CycleEvent::ExtractorStaged { extractor, .. } => format!("staged:{extractor}"),
            CycleEvent::ExtractorEmpty { extractor } => format!("empty:{extractor}"),
            CycleEvent::ExtractorSkipped { extractor, .. } => format!("skipped:{extractor}"),
            CycleEvent::ExtractorFailed { extractor, .. } => format!("failed:{extractor}"),
            CycleEvent::ExtractorCancelled { extractor } => format!("cancelled:{extractor}"),
            CycleEvent::CycleCompleted { .. } => "cycle_completed".to_string(),
            CycleEvent::CycleCancelled { .. } => "cycle_cancelled".to_string(),
            CycleEvent::CycleElapsed { .. } => "cycle_elapsed".to_string(),
            CycleEvent::CycleFailed { .. } => "cycle_failed".to_string(),
            CycleEvent::Sleeping { .. } => "sleeping".to_string(),
            CycleEvent::Stopped { .. } => "stopped".to_string(),
        };
        self.events.lock().unwrap().push(label);
    }
}
