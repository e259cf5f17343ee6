use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Shortest interval the scheduler will ever sleep between cycles.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_INTERVAL_SECS: i64 = 300;

pub const DEFAULT_STAGING_PATH: &str = "staging";

/// Raise sub-second intervals to [`MIN_INTERVAL`].
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_INTERVAL)
}

/// Convert a configured number of seconds into an interval.
///
/// Zero and negative values are clamped to one second.
pub fn interval_from_secs(secs: i64) -> Duration {
    Duration::from_secs(secs.max(1) as u64)
}

/// Read a non-blank value for `key`.
pub fn lookup_string<L>(lookup: &L, key: &str) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse `key`, falling back to `default` when it is unset.
pub fn lookup_parse<L, T>(lookup: &L, key: &str, default: T) -> Result<T, AppError>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup_string(lookup, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::ConfigError(format!("Invalid {key} '{raw}'"))),
    }
}

/// Process environment as a lookup function.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Scheduler cadence.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: interval_from_secs(DEFAULT_INTERVAL_SECS),
        }
    }
}

impl SchedulerConfig {
    /// Read configuration from environment variables.
    ///
    /// - `SLUICE_INTERVAL_SECS` (optional, defaults to 300, clamped to >= 1)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let secs: i64 = lookup_parse(&lookup, "SLUICE_INTERVAL_SECS", DEFAULT_INTERVAL_SECS)?;
        Ok(Self {
            interval: interval_from_secs(secs),
        })
    }
}

/// Where staged artifacts are written.
#[derive(Debug, Clone)]
pub struct StagingConfig {
    pub base_path: PathBuf,
}

impl StagingConfig {
    /// Read configuration from environment variables.
    ///
    /// - `SLUICE_STAGING_PATH` (optional, defaults to `staging`); relative
    ///   paths resolve against the working directory.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let raw = lookup_string(&lookup, "SLUICE_STAGING_PATH")
            .unwrap_or_else(|| DEFAULT_STAGING_PATH.to_string());
        Ok(Self {
            base_path: resolve_path(Path::new(&raw))?,
        })
    }
}

/// Make `path` absolute relative to the working directory.
pub fn resolve_path(path: &Path) -> Result<PathBuf, AppError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| AppError::ConfigError(format!("Cannot resolve working directory: {e}")))?;
    Ok(cwd.join(path))
}
