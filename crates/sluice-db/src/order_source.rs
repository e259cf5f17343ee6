use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sluice_core::error::AppError;
use sluice_core::models::{Extracted, OrderDetailRecord};
use sluice_core::traits::{Extractor, StagingSink, stage_records};
use sqlx::postgres::PgRow;
use sqlx::{Connection, FromRow, PgConnection, Row};
use tokio_util::sync::CancellationToken;

use crate::config::DatabaseSourceConfig;

/// Reads order lines from PostgreSQL with a configured query.
///
/// Each cycle opens its own connection and closes it once the rows are in.
#[derive(Debug, Clone)]
pub struct DatabaseOrderExtractor {
    config: DatabaseSourceConfig,
}

impl DatabaseOrderExtractor {
    pub fn new(config: DatabaseSourceConfig) -> Self {
        Self { config }
    }

    async fn fetch_orders(
        &self,
        url: &str,
        query: &str,
    ) -> Result<Vec<OrderDetailRecord>, AppError> {
        let timeout = self.config.timeout;

        let mut conn = tokio::time::timeout(timeout, PgConnection::connect(url))
            .await
            .map_err(|_| AppError::Timeout(timeout.as_secs()))?
            .map_err(|e| AppError::DatabaseError(format!("Connection failed: {e}")))?;

        let rows = tokio::time::timeout(
            timeout,
            sqlx::query_as::<_, OrderRow>(query).fetch_all(&mut conn),
        )
        .await
        .map_err(|_| AppError::Timeout(timeout.as_secs()))?
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "Failed to close database connection cleanly");
        }

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl Extractor for DatabaseOrderExtractor {
    fn name(&self) -> &str {
        &self.config.dataset
    }

    async fn extract(
        &self,
        sink: &dyn StagingSink,
        cancel: &CancellationToken,
    ) -> Result<Extracted, AppError> {
        let (Some(url), Some(query)) = (self.config.url.as_deref(), self.config.query.as_deref())
        else {
            return Ok(Extracted::Skipped {
                reason: "database connection string or query is not configured".into(),
            });
        };

        let orders = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AppError::Cancelled),
            result = self.fetch_orders(url, query) => result?,
        };

        tracing::info!(count = orders.len(), "Database extraction produced records");
        if orders.is_empty() {
            return Ok(Extracted::Empty);
        }

        let artifact = stage_records(sink, &self.config.dataset, &orders, cancel).await?;
        Ok(Extracted::Staged(artifact))
    }
}

/// Internal row type for sqlx mapping.
struct OrderRow {
    order_id: i32,
    customer_id: i32,
    product_id: i32,
    quantity: i32,
    total_price: f64,
    order_date: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            order_id: row.try_get("order_id")?,
            customer_id: row.try_get("customer_id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            total_price: decode_price(row, "total_price")?,
            order_date: decode_timestamp(row, "order_date")?,
        })
    }
}

/// Accepts `NUMERIC` as well as `FLOAT8` price columns.
fn decode_price(row: &PgRow, column: &str) -> Result<f64, sqlx::Error> {
    match row.try_get::<Decimal, _>(column) {
        Ok(price) => price.to_f64().ok_or_else(|| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: format!("{price} does not fit in a float").into(),
        }),
        Err(sqlx::Error::ColumnDecode { .. }) => row.try_get::<f64, _>(column),
        Err(e) => Err(e),
    }
}

/// Accepts `TIMESTAMPTZ` as well as `TIMESTAMP`; the latter is read as UTC.
fn decode_timestamp(row: &PgRow, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    match row.try_get::<DateTime<Utc>, _>(column) {
        Ok(at) => Ok(at),
        Err(sqlx::Error::ColumnDecode { .. }) => row
            .try_get::<NaiveDateTime, _>(column)
            .map(|at| at.and_utc()),
        Err(e) => Err(e),
    }
}

impl From<OrderRow> for OrderDetailRecord {
    fn from(row: OrderRow) -> Self {
        OrderDetailRecord {
            order_id: row.order_id,
            customer_id: row.customer_id,
            product_id: row.product_id,
            quantity: row.quantity,
            total_price: row.total_price,
            order_date: row.order_date,
        }
    }
}
