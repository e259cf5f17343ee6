use std::time::Duration;

use sluice_core::config::{env_lookup, lookup_parse, lookup_string};
use sluice_core::error::AppError;

pub const DEFAULT_DB_DATASET: &str = "order_details";
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 60;

/// Configuration for the order database source.
#[derive(Debug, Clone)]
pub struct DatabaseSourceConfig {
    pub dataset: String,
    pub url: Option<String>,
    pub query: Option<String>,
    pub timeout: Duration,
}

impl Default for DatabaseSourceConfig {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_DB_DATASET.to_string(),
            url: None,
            query: None,
            timeout: Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS),
        }
    }
}

impl DatabaseSourceConfig {
    /// Read configuration from environment variables.
    ///
    /// - `SLUICE_DB_DATASET` (optional, defaults to `order_details`)
    /// - `SLUICE_DB_URL` (optional; the source is skipped without it)
    /// - `SLUICE_DB_QUERY` (optional; the source is skipped without it)
    /// - `SLUICE_DB_TIMEOUT_SECS` (optional, defaults to 60)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let timeout_secs: u64 =
            lookup_parse(&lookup, "SLUICE_DB_TIMEOUT_SECS", DEFAULT_DB_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "SLUICE_DB_TIMEOUT_SECS must be at least 1".into(),
            ));
        }

        Ok(Self {
            dataset: lookup_string(&lookup, "SLUICE_DB_DATASET")
                .unwrap_or_else(|| DEFAULT_DB_DATASET.to_string()),
            url: lookup_string(&lookup, "SLUICE_DB_URL"),
            query: lookup_string(&lookup, "SLUICE_DB_QUERY"),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Both a connection string and a query are set.
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.query.is_some()
    }
}
