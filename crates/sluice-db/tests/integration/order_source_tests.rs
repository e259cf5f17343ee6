use std::time::Duration;

use sluice_core::{Extracted, Extractor, FileStagingSink};
use sluice_db::{DatabaseOrderExtractor, DatabaseSourceConfig};
use tokio_util::sync::CancellationToken;

use crate::integration::common::setup_test_db;

fn extractor(url: &str, query: &str) -> DatabaseOrderExtractor {
    DatabaseOrderExtractor::new(DatabaseSourceConfig {
        url: Some(url.to_string()),
        query: Some(query.to_string()),
        timeout: Duration::from_secs(10),
        ..Default::default()
    })
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn stages_order_rows_in_query_order() {
    let db = setup_test_db().await;
    let staging = tempfile::tempdir().unwrap();
    let sink = FileStagingSink::new(staging.path());

    let result = extractor(
        &db.url,
        "SELECT * FROM order_details ORDER BY order_id, product_id",
    )
    .extract(&sink, &CancellationToken::new())
    .await
    .unwrap();

    let Extracted::Staged(artifact) = result else {
        panic!("expected staged artifact");
    };
    assert_eq!(artifact.dataset, "order_details");
    assert_eq!(artifact.record_count, 3);

    let rows: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&artifact.location).unwrap()).unwrap();
    assert_eq!(rows[0]["OrderId"], 1001);
    assert_eq!(rows[0]["ProductId"], 10);
    assert_eq!(rows[1]["TotalPrice"], 120.0);
    assert_eq!(rows[2]["Quantity"], 5);
    assert!(rows[2]["OrderDate"].as_str().unwrap().starts_with("2024-03-02T14:00:00"));
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn no_rows_is_empty() {
    let db = setup_test_db().await;
    let staging = tempfile::tempdir().unwrap();

    let result = extractor(&db.url, "SELECT * FROM order_details WHERE quantity > 100")
        .extract(
            &FileStagingSink::new(staging.path()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result, Extracted::Empty);
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn invalid_query_is_a_database_error() {
    let db = setup_test_db().await;
    let staging = tempfile::tempdir().unwrap();

    let err = extractor(&db.url, "SELECT * FROM missing_table")
        .extract(
            &FileStagingSink::new(staging.path()),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, sluice_core::AppError::DatabaseError(_)));
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn slow_query_hits_the_command_timeout() {
    let db = setup_test_db().await;
    let staging = tempfile::tempdir().unwrap();
    let extractor = DatabaseOrderExtractor::new(DatabaseSourceConfig {
        url: Some(db.url.clone()),
        query: Some("SELECT *, pg_sleep(5) IS NULL AS slept FROM order_details".into()),
        timeout: Duration::from_secs(1),
        ..Default::default()
    });

    let err = extractor
        .extract(
            &FileStagingSink::new(staging.path()),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, sluice_core::AppError::Timeout(1)));
    // Fixture pool stays usable after the aborted query.
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM order_details")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn numeric_price_and_plain_timestamp_are_decoded() {
    let db = setup_test_db().await;
    let staging = tempfile::tempdir().unwrap();

    let result = extractor(&db.url, "SELECT * FROM order_details_numeric ORDER BY order_id")
        .extract(
            &FileStagingSink::new(staging.path()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let Extracted::Staged(artifact) = result else {
        panic!("expected staged artifact");
    };
    assert_eq!(artifact.record_count, 2);

    let rows: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&artifact.location).unwrap()).unwrap();
    let price = |i: usize| rows[i]["TotalPrice"].as_f64().unwrap();
    assert!((price(0) - 59.96).abs() < 1e-9);
    assert!((price(1) - 1249.5).abs() < 1e-9);
    assert!(rows[0]["OrderDate"].as_str().unwrap().starts_with("2024-04-10T08:15:00"));
    assert!(rows[1]["OrderDate"].as_str().unwrap().starts_with("2024-04-11T17:45:30"));
}
