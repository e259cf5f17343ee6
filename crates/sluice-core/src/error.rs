use std::path::PathBuf;

use thiserror::Error;

/// Application-wide error types for Sluice.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request to a remote source failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request or query timed out.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// A flat file could not be read or parsed.
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Writing to the staging area failed.
    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Work was abandoned because cancellation was requested.
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            AppError::Cancelled | AppError::Staging(StagingError::Cancelled)
        )
    }
}

/// Failures of the staging sink.
#[derive(Error, Debug)]
pub enum StagingError {
    /// Dataset name is empty or would escape the staging directory.
    #[error("Invalid dataset name '{0}'")]
    InvalidDataset(String),

    /// The destination could not be created or written.
    #[error("Cannot write to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Records could not be serialized.
    #[error("Failed to serialize records: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cancellation was requested before the artifact was persisted.
    #[error("Staging cancelled")]
    Cancelled,
}

impl StagingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StagingError::Io {
            path: path.into(),
            source,
        }
    }
}
