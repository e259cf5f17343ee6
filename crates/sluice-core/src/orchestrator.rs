use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{CycleReport, ExtractionOutcome, ExtractorReport};
use crate::traits::{Extractor, StagingSink};

/// Events emitted by the orchestrator and scheduler for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CycleEvent<'a> {
    CycleStarted {
        cycle: u64,
        extractors: usize,
    },
    NoExtractors {
        cycle: u64,
    },
    ExtractorStarted {
        extractor: &'a str,
    },
    ExtractorStaged {
        extractor: &'a str,
        location: &'a Path,
        records: usize,
    },
    ExtractorEmpty {
        extractor: &'a str,
    },
    ExtractorSkipped {
        extractor: &'a str,
        reason: &'a str,
    },
    ExtractorFailed {
        extractor: &'a str,
        error: &'a str,
    },
    ExtractorCancelled {
        extractor: &'a str,
    },
    CycleCompleted {
        report: &'a CycleReport,
    },
    CycleCancelled {
        cycle: u64,
    },
    /// Wall time of a settled cycle, measured by the scheduler.
    CycleElapsed {
        cycle: u64,
        elapsed: Duration,
    },
    CycleFailed {
        error: &'a AppError,
    },
    Sleeping {
        interval: Duration,
    },
    Stopped {
        cycles: u64,
    },
}

/// Trait for receiving cycle events (decoupled logging).
pub trait CycleReporter: Send + Sync {
    fn report(&self, event: CycleEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCycleReporter;

impl CycleReporter for TracingCycleReporter {
    fn report(&self, event: CycleEvent<'_>) {
        match event {
            CycleEvent::CycleStarted { cycle, extractors } => {
                tracing::info!(%cycle, %extractors, "Starting extraction cycle");
            }
            CycleEvent::NoExtractors { cycle } => {
                tracing::warn!(%cycle, "No extractors were registered, skipping extraction cycle");
            }
            CycleEvent::ExtractorStarted { extractor } => {
                tracing::info!(%extractor, "Starting extraction");
            }
            CycleEvent::ExtractorStaged {
                extractor,
                location,
                records,
            } => {
                tracing::info!(%extractor, %records, path = %location.display(), "Extraction completed");
            }
            CycleEvent::ExtractorEmpty { extractor } => {
                tracing::warn!(%extractor, "Extraction produced no records");
            }
            CycleEvent::ExtractorSkipped { extractor, reason } => {
                tracing::warn!(%extractor, %reason, "Extraction skipped");
            }
            CycleEvent::ExtractorFailed { extractor, error } => {
                tracing::error!(%extractor, %error, "Extraction failed");
            }
            CycleEvent::ExtractorCancelled { extractor } => {
                tracing::warn!(%extractor, "Extraction cancelled");
            }
            CycleEvent::CycleCompleted { report } => {
                tracing::info!(
                    cycle = %report.cycle,
                    staged = %report.staged(),
                    empty = %report.empty(),
                    skipped = %report.skipped(),
                    failed = %report.failed(),
                    "All extractors finished for this cycle"
                );
            }
            CycleEvent::CycleCancelled { cycle } => {
                tracing::warn!(%cycle, "Extraction cycle cancelled");
            }
            CycleEvent::CycleElapsed { cycle, elapsed } => {
                tracing::info!(%cycle, elapsed_ms = %elapsed.as_millis(), "Extraction cycle completed in {elapsed:?}");
            }
            CycleEvent::CycleFailed { error } => {
                tracing::error!(%error, "Extraction cycle failed");
            }
            CycleEvent::Sleeping { interval } => {
                tracing::debug!(interval_secs = %interval.as_secs(), "Waiting for next cycle");
            }
            CycleEvent::Stopped { cycles } => {
                tracing::info!(%cycles, "Scheduler stopped");
            }
        }
    }
}

/// Runs every registered extractor once per cycle, concurrently and in
/// isolation from each other.
pub struct Orchestrator {
    extractors: Vec<Arc<dyn Extractor>>,
    sink: Arc<dyn StagingSink>,
    cycles: AtomicU64,
}

impl Orchestrator {
    pub fn new(sink: Arc<dyn StagingSink>) -> Self {
        Self {
            extractors: Vec::new(),
            sink,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn with_extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.register(Arc::new(extractor));
        self
    }

    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    pub fn extractor_names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Run one cycle: every extractor once, all in parallel.
    ///
    /// Returns only after every task has settled. A failing extractor is
    /// recorded in the report and never affects its siblings. If `cancel`
    /// fired during the cycle, the in-flight tasks are still awaited and
    /// then [`AppError::Cancelled`] is returned instead of the report.
    ///
    /// Dropping the returned future aborts all outstanding tasks.
    pub async fn run_cycle<R: CycleReporter>(
        &self,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<CycleReport, AppError> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = Utc::now();

        if self.extractors.is_empty() {
            reporter.report(CycleEvent::NoExtractors { cycle });
            return Ok(CycleReport {
                cycle,
                started_at,
                finished_at: Utc::now(),
                extractors: Vec::new(),
            });
        }

        if cancel.is_cancelled() {
            reporter.report(CycleEvent::CycleCancelled { cycle });
            return Err(AppError::Cancelled);
        }

        reporter.report(CycleEvent::CycleStarted {
            cycle,
            extractors: self.extractors.len(),
        });

        let cycle_started = Instant::now();
        let mut tasks = JoinSet::new();
        let mut names = HashMap::with_capacity(self.extractors.len());
        for extractor in &self.extractors {
            reporter.report(CycleEvent::ExtractorStarted {
                extractor: extractor.name(),
            });
            let handle = tasks.spawn(run_extractor(
                Arc::clone(extractor),
                Arc::clone(&self.sink),
                cancel.clone(),
            ));
            names.insert(handle.id(), extractor.name());
        }

        let mut reports = Vec::with_capacity(self.extractors.len());
        while let Some(joined) = tasks.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    let name = names.get(&e.id()).copied().unwrap_or("unknown");
                    join_error_report(name, &e, cycle_started.elapsed())
                }
            };
            report_outcome(reporter, &report);
            reports.push(report);
        }

        if cancel.is_cancelled() {
            reporter.report(CycleEvent::CycleCancelled { cycle });
            return Err(AppError::Cancelled);
        }

        let report = CycleReport {
            cycle,
            started_at,
            finished_at: Utc::now(),
            extractors: reports,
        };
        reporter.report(CycleEvent::CycleCompleted { report: &report });
        Ok(report)
    }
}

async fn run_extractor(
    extractor: Arc<dyn Extractor>,
    sink: Arc<dyn StagingSink>,
    cancel: CancellationToken,
) -> ExtractorReport {
    let started = Instant::now();
    let result = AssertUnwindSafe(extractor.extract(sink.as_ref(), &cancel))
        .catch_unwind()
        .await;

    let outcome = match result {
        Ok(Ok(extracted)) => extracted.into(),
        Ok(Err(e)) if e.is_cancelled() => ExtractionOutcome::Cancelled,
        Ok(Err(e)) => ExtractionOutcome::Failed {
            error: e.to_string(),
        },
        Err(panic) => ExtractionOutcome::Failed {
            error: format!("extractor panicked: {}", panic_message(panic.as_ref())),
        },
    };

    ExtractorReport {
        extractor: extractor.name().to_string(),
        outcome,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

/// Report for a task that never handed back its own report. Panics are
/// caught inside the task, so this is normally an abort.
fn join_error_report(extractor: &str, error: &JoinError, elapsed: Duration) -> ExtractorReport {
    let outcome = if error.is_cancelled() {
        ExtractionOutcome::Cancelled
    } else {
        ExtractionOutcome::Failed {
            error: format!("extraction task failed: {error}"),
        }
    };
    ExtractorReport {
        extractor: extractor.to_string(),
        outcome,
        elapsed_ms: elapsed.as_millis() as u64,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

fn report_outcome<R: CycleReporter>(reporter: &R, report: &ExtractorReport) {
    let extractor = report.extractor.as_str();
    let event = match &report.outcome {
        ExtractionOutcome::Staged { location, records } => CycleEvent::ExtractorStaged {
            extractor,
            location,
            records: *records,
        },
        ExtractionOutcome::Empty => CycleEvent::ExtractorEmpty { extractor },
        ExtractionOutcome::Skipped { reason } => CycleEvent::ExtractorSkipped { extractor, reason },
        ExtractionOutcome::Failed { error } => CycleEvent::ExtractorFailed { extractor, error },
        ExtractionOutcome::Cancelled => CycleEvent::ExtractorCancelled { extractor },
    };
    reporter.report(event);
}
