pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod scheduler;
pub mod staging;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use config::{SchedulerConfig, StagingConfig};
pub use error::{AppError, StagingError};
pub use models::{CycleReport, Extracted, ExtractionOutcome, ExtractorReport, StagedArtifact};
pub use orchestrator::{CycleEvent, CycleReporter, Orchestrator, TracingCycleReporter};
pub use scheduler::Scheduler;
pub use staging::FileStagingSink;
pub use traits::{Extractor, IntervalSource, StagingSink, stage_records};
