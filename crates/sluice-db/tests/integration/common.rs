use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Schema and seed data, executed one statement at a time.
const FIXTURES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS order_details (
        order_id INTEGER NOT NULL,
        customer_id INTEGER NOT NULL,
        product_id INTEGER NOT NULL,
        quantity INTEGER NOT NULL,
        total_price DOUBLE PRECISION NOT NULL,
        order_date TIMESTAMPTZ NOT NULL
    )"#,
    r#"INSERT INTO order_details VALUES
        (1001, 1, 10, 2, 39.0, '2024-03-01T09:30:00Z'),
        (1001, 1, 11, 1, 120.0, '2024-03-01T09:30:00Z'),
        (1002, 2, 10, 5, 97.5, '2024-03-02T14:00:00Z')"#,
    r#"CREATE TABLE IF NOT EXISTS order_details_numeric (
        order_id INTEGER NOT NULL,
        customer_id INTEGER NOT NULL,
        product_id INTEGER NOT NULL,
        quantity INTEGER NOT NULL,
        total_price NUMERIC(10,2) NOT NULL,
        order_date TIMESTAMP NOT NULL
    )"#,
    r#"INSERT INTO order_details_numeric VALUES
        (2001, 3, 12, 4, 59.96, '2024-04-10 08:15:00'),
        (2002, 4, 13, 1, 1249.50, '2024-04-11 17:45:30')"#,
];

/// A running PostgreSQL container with the order fixtures loaded.
///
/// The `ContainerAsync` must be kept in scope for the test duration;
/// dropping it stops the container.
pub struct TestDb {
    pub url: String,
    pub pool: PgPool,
    _container: ContainerAsync<GenericImage>,
}

pub async fn setup_test_db() -> TestDb {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "sluice_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let url = format!("postgresql://postgres:postgres@{host}:{port}/sluice_test");

    // Retry connection until container is fully ready
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new().max_connections(2).connect(&url).await {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    for statement in FIXTURES {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to load fixtures");
    }

    TestDb {
        url,
        pool,
        _container: container,
    }
}
