use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sluice_core::config::{env_lookup, lookup_parse, lookup_string};
use sluice_core::error::AppError;
use sluice_core::models::{Extracted, ProductRecord};
use sluice_core::traits::{Extractor, StagingSink, stage_records};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const DEFAULT_API_DATASET: &str = "products";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Remote catalogue endpoint.
#[derive(Debug, Clone)]
pub struct ApiSourceConfig {
    pub dataset: String,
    pub base_url: Option<String>,
    /// Relative to `base_url`, or absolute when no base is set.
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

impl Default for ApiSourceConfig {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_API_DATASET.to_string(),
            base_url: None,
            endpoint: None,
            timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
        }
    }
}

impl ApiSourceConfig {
    /// Read configuration from environment variables.
    ///
    /// - `SLUICE_API_DATASET` (optional, defaults to `products`)
    /// - `SLUICE_API_BASE_URL` (optional)
    /// - `SLUICE_API_ENDPOINT` (optional; the source is skipped without it)
    /// - `SLUICE_API_TIMEOUT_SECS` (optional, defaults to 30, at least 1)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let timeout_secs: i64 =
            lookup_parse(&lookup, "SLUICE_API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS as i64)?;
        Ok(Self {
            dataset: lookup_string(&lookup, "SLUICE_API_DATASET")
                .unwrap_or_else(|| DEFAULT_API_DATASET.to_string()),
            base_url: lookup_string(&lookup, "SLUICE_API_BASE_URL"),
            endpoint: lookup_string(&lookup, "SLUICE_API_ENDPOINT"),
            timeout: Duration::from_secs(timeout_secs.max(1) as u64),
        })
    }
}

/// Fetches the product catalogue from a JSON HTTP API.
#[derive(Clone)]
pub struct ApiProductExtractor {
    client: Client,
    config: ApiSourceConfig,
}

impl ApiProductExtractor {
    pub fn new(config: ApiSourceConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("Sluice/0.3 (ETL intake)")
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Full request URL, or `None` when no endpoint is configured.
    fn endpoint_url(&self) -> Result<Option<Url>, AppError> {
        let Some(endpoint) = self.config.endpoint.as_deref() else {
            return Ok(None);
        };
        let url = match self.config.base_url.as_deref() {
            Some(base) => Url::parse(base).and_then(|b| b.join(endpoint)),
            None => Url::parse(endpoint),
        }
        .map_err(|e| AppError::ConfigError(format!("Invalid API endpoint '{endpoint}': {e}")))?;
        Ok(Some(url))
    }

    async fn fetch(&self, url: &Url) -> Result<Option<Vec<ProductRecord>>, AppError> {
        let timeout_secs = self.config.timeout.as_secs();
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(timeout_secs)
            } else {
                AppError::HttpError(format!("Invalid product payload from {url}: {e}"))
            }
        })
    }
}

#[async_trait]
impl Extractor for ApiProductExtractor {
    fn name(&self) -> &str {
        &self.config.dataset
    }

    async fn extract(
        &self,
        sink: &dyn StagingSink,
        cancel: &CancellationToken,
    ) -> Result<Extracted, AppError> {
        let Some(url) = self.endpoint_url()? else {
            return Ok(Extracted::Skipped {
                reason: "API endpoint is not configured".into(),
            });
        };

        let products = tokio::select! {
            result = self.fetch(&url) => result?,
            () = cancel.cancelled() => return Err(AppError::Cancelled),
        };

        let Some(products) = products else {
            return Ok(Extracted::Skipped {
                reason: format!("API response for {url} returned no data"),
            });
        };

        tracing::info!(count = products.len(), %url, "API extraction produced records");
        if products.is_empty() {
            return Ok(Extracted::Empty);
        }

        let artifact = stage_records(sink, &self.config.dataset, &products, cancel).await?;
        Ok(Extracted::Staged(artifact))
    }
}
