use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sluice_core::config::{env_lookup, lookup_string, resolve_path};
use sluice_core::error::AppError;
use sluice_core::models::{CustomerRecord, Extracted};
use sluice_core::traits::{Extractor, StagingSink, stage_records};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CSV_DATASET: &str = "customers";
pub const DEFAULT_SEARCH_PATTERN: &str = "*.csv";

/// Where the customer CSV files live.
#[derive(Debug, Clone)]
pub struct CsvSourceConfig {
    pub dataset: String,
    /// A single file to read, if present.
    pub file_path: Option<PathBuf>,
    /// A directory whose top-level files matching `search_pattern` are read.
    pub directory_path: Option<PathBuf>,
    pub search_pattern: String,
    pub delimiter: u8,
}

impl Default for CsvSourceConfig {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_CSV_DATASET.to_string(),
            file_path: None,
            directory_path: None,
            search_pattern: DEFAULT_SEARCH_PATTERN.to_string(),
            delimiter: b',',
        }
    }
}

impl CsvSourceConfig {
    /// Read configuration from environment variables.
    ///
    /// - `SLUICE_CSV_DATASET` (optional, defaults to `customers`)
    /// - `SLUICE_CSV_FILE` (optional)
    /// - `SLUICE_CSV_DIR` (optional)
    /// - `SLUICE_CSV_PATTERN` (optional, defaults to `*.csv`)
    /// - `SLUICE_CSV_DELIMITER` (optional, single ASCII character, defaults to `,`)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let delimiter = match lookup("SLUICE_CSV_DELIMITER").filter(|v| !v.is_empty()) {
            None => b',',
            Some(raw) => parse_delimiter(&raw)?,
        };
        let file_path = lookup_string(&lookup, "SLUICE_CSV_FILE")
            .map(|p| resolve_path(Path::new(&p)))
            .transpose()?;
        let directory_path = lookup_string(&lookup, "SLUICE_CSV_DIR")
            .map(|p| resolve_path(Path::new(&p)))
            .transpose()?;

        Ok(Self {
            dataset: lookup_string(&lookup, "SLUICE_CSV_DATASET")
                .unwrap_or_else(|| DEFAULT_CSV_DATASET.to_string()),
            file_path,
            directory_path,
            search_pattern: lookup_string(&lookup, "SLUICE_CSV_PATTERN")
                .unwrap_or_else(|| DEFAULT_SEARCH_PATTERN.to_string()),
            delimiter,
        })
    }
}

fn parse_delimiter(raw: &str) -> Result<u8, AppError> {
    // A tab is a legitimate delimiter, so don't trim.
    match raw.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(AppError::ConfigError(format!(
            "Invalid SLUICE_CSV_DELIMITER '{raw}': must be a single ASCII character"
        ))),
    }
}

/// Reads customer rows from one or more CSV files.
#[derive(Debug, Clone)]
pub struct CsvCustomerExtractor {
    config: CsvSourceConfig,
}

impl CsvCustomerExtractor {
    pub fn new(config: CsvSourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Extractor for CsvCustomerExtractor {
    fn name(&self) -> &str {
        &self.config.dataset
    }

    async fn extract(
        &self,
        sink: &dyn StagingSink,
        cancel: &CancellationToken,
    ) -> Result<Extracted, AppError> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let config = self.config.clone();
        let token = cancel.clone();
        let loaded = tokio::task::spawn_blocking(move || load_customers(&config, &token))
            .await
            .map_err(|e| AppError::Generic(format!("CSV reader task failed: {e}")))??;

        let Some(records) = loaded else {
            return Ok(Extracted::Skipped {
                reason: format!("no CSV files discovered for dataset {}", self.config.dataset),
            });
        };
        if records.is_empty() {
            return Ok(Extracted::Empty);
        }

        let artifact = stage_records(sink, &self.config.dataset, &records, cancel).await?;
        Ok(Extracted::Staged(artifact))
    }
}

/// Discover and read every candidate file. Returns `None` when there is
/// nothing to read. Blocking; the token is checked before each file.
fn load_customers(
    config: &CsvSourceConfig,
    cancel: &CancellationToken,
) -> Result<Option<Vec<CustomerRecord>>, AppError> {
    let files = candidate_files(config);
    if files.is_empty() {
        return Ok(None);
    }

    let mut records = Vec::new();
    for file in &files {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let file_records = read_customers(file, config.delimiter)?;
        tracing::info!(count = file_records.len(), file = %file.display(), "Read records from CSV file");
        records.extend(file_records);
    }

    tracing::info!(count = records.len(), files = files.len(), "CSV extraction produced records");
    Ok(Some(records))
}

/// Files to read this cycle, configured file first, without duplicates.
fn candidate_files(config: &CsvSourceConfig) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    let mut push = |path: PathBuf| {
        if seen.insert(path.to_string_lossy().to_lowercase()) {
            files.push(path);
        }
    };

    if let Some(file) = &config.file_path {
        if file.is_file() {
            push(file.clone());
        } else {
            tracing::warn!(path = %file.display(), "Configured CSV file was not found");
        }
    }

    if let Some(dir) = &config.directory_path {
        match matching_files(dir, &config.search_pattern) {
            Ok(matched) if matched.is_empty() => {
                tracing::warn!(
                    directory = %dir.display(),
                    pattern = %config.search_pattern,
                    "No CSV files in directory matched pattern"
                );
            }
            Ok(matched) => matched.into_iter().for_each(&mut push),
            Err(e) => {
                tracing::warn!(directory = %dir.display(), error = %e, "Configured CSV directory was not found");
            }
        }
    }

    files
}

/// Parse every row of `path` as a customer. Short rows are accepted and
/// their missing columns defaulted. Field values are kept verbatim.
fn read_customers(path: &Path, delimiter: u8) -> Result<Vec<CustomerRecord>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| AppError::CsvError(format!("{}: {e}", path.display())))?;

    reader
        .deserialize()
        .collect::<Result<Vec<CustomerRecord>, _>>()
        .map_err(|e| AppError::CsvError(format!("{}: {e}", path.display())))
}

/// Top-level files of `dir` whose names match `pattern`, sorted by name.
fn matching_files(dir: &Path, pattern: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut matched = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if wildcard_match(pattern, &name.to_string_lossy()) {
            matched.push(entry.path());
        }
    }
    matched.sort();
    Ok(matched)
}

/// Case-insensitive match supporting `*` (any run) and `?` (one char).
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
