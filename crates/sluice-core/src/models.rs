use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A customer row read from the CSV source.
///
/// Columns missing from a file are defaulted rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CustomerRecord {
    pub customer_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub country: String,
}

/// A product returned by the catalogue API.
///
/// The API speaks camelCase; staged artifacts keep the PascalCase names
/// used by every other dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "PascalCase", deserialize = "camelCase"))]
pub struct ProductRecord {
    #[serde(alias = "ProductId")]
    pub product_id: i32,
    #[serde(alias = "ProductName")]
    pub product_name: String,
    #[serde(alias = "Category")]
    pub category: String,
    #[serde(alias = "Price")]
    pub price: f64,
    #[serde(alias = "Stock")]
    pub stock: i32,
}

/// An order line read from the orders database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderDetailRecord {
    pub order_id: i32,
    pub customer_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub total_price: f64,
    pub order_date: DateTime<Utc>,
}

/// A durably written batch of records for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedArtifact {
    pub dataset: String,
    pub location: PathBuf,
    pub record_count: usize,
    pub staged_at: DateTime<Utc>,
}

/// What an extractor did with its source during one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// Records were produced and handed to the sink.
    Staged(StagedArtifact),
    /// The source answered with zero records; nothing was written.
    Empty,
    /// The source is not configured or had nothing to read.
    Skipped { reason: String },
}

/// Final state of one extraction task, as recorded by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExtractionOutcome {
    Staged { location: PathBuf, records: usize },
    Empty,
    Skipped { reason: String },
    Failed { error: String },
    Cancelled,
}

impl ExtractionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionOutcome::Staged { .. } => "staged",
            ExtractionOutcome::Empty => "empty",
            ExtractionOutcome::Skipped { .. } => "skipped",
            ExtractionOutcome::Failed { .. } => "failed",
            ExtractionOutcome::Cancelled => "cancelled",
        }
    }
}

impl From<Extracted> for ExtractionOutcome {
    fn from(extracted: Extracted) -> Self {
        match extracted {
            Extracted::Staged(artifact) => ExtractionOutcome::Staged {
                location: artifact.location,
                records: artifact.record_count,
            },
            Extracted::Empty => ExtractionOutcome::Empty,
            Extracted::Skipped { reason } => ExtractionOutcome::Skipped { reason },
        }
    }
}

/// Outcome of a single extractor within a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractorReport {
    pub extractor: String,
    #[serde(flatten)]
    pub outcome: ExtractionOutcome,
    pub elapsed_ms: u64,
}

/// Summary of one pass over all registered extractors.
///
/// Extractor reports are in completion order, which is unspecified.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub extractors: Vec<ExtractorReport>,
}

impl CycleReport {
    pub fn staged(&self) -> usize {
        self.count(|o| matches!(o, ExtractionOutcome::Staged { .. }))
    }

    pub fn empty(&self) -> usize {
        self.count(|o| matches!(o, ExtractionOutcome::Empty))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ExtractionOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ExtractionOutcome::Failed { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, ExtractionOutcome::Cancelled))
    }

    /// Look up the report of an extractor by name.
    pub fn extractor(&self, name: &str) -> Option<&ExtractorReport> {
        self.extractors.iter().find(|r| r.extractor == name)
    }

    fn count(&self, pred: impl Fn(&ExtractionOutcome) -> bool) -> usize {
        self.extractors.iter().filter(|r| pred(&r.outcome)).count()
    }
}
