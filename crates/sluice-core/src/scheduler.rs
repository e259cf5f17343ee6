use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::clamp_interval;
use crate::error::AppError;
use crate::orchestrator::{CycleEvent, CycleReporter, Orchestrator};
use crate::traits::IntervalSource;

/// Drives the orchestrator on a fixed delay until cancelled.
///
/// The first cycle starts immediately. After each cycle settles the
/// scheduler reads the interval from its [`IntervalSource`] and sleeps that
/// long; time spent in the cycle is not subtracted, so cycles never overlap
/// and the cadence drifts by the cycle duration.
pub struct Scheduler<I> {
    orchestrator: Arc<Orchestrator>,
    interval: I,
}

impl<I: IntervalSource> Scheduler<I> {
    pub fn new(orchestrator: Arc<Orchestrator>, interval: I) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run cycles until `cancel` fires. Returns the number of cycles that
    /// ran to completion.
    pub async fn run<R: CycleReporter>(
        &self,
        cancel: CancellationToken,
        reporter: &R,
    ) -> Result<u64, AppError> {
        let mut completed = 0u64;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let started = Instant::now();
            match self.orchestrator.run_cycle(&cancel, reporter).await {
                Ok(report) => {
                    completed += 1;
                    reporter.report(CycleEvent::CycleElapsed {
                        cycle: report.cycle,
                        elapsed: started.elapsed(),
                    });
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => reporter.report(CycleEvent::CycleFailed { error: &e }),
            }

            let interval = clamp_interval(self.interval.interval());
            reporter.report(CycleEvent::Sleeping { interval });
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = cancel.cancelled() => break,
            }
        }

        reporter.report(CycleEvent::Stopped { cycles: completed });
        Ok(completed)
    }
}
