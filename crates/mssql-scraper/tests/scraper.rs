//! End-to-end scrape cycles over a mock connection.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mssql_queries::{QueryKind, SampleParams};
use mssql_records::AnyValue;
use mssql_records::MetricValue;
use mssql_records::metrics::{attrs, names};
use mssql_scraper::{
    ClientProvider, Connection, ConnectionConfig, DbError, DbProvider, RawRow, ScrapeError,
    Scraper, ScraperConfig, SqlRowClientProvider,
};

/// Connection returning one canned row set per `query` call, then empty.
struct MockConnection {
    responses: Mutex<Vec<Vec<RawRow>>>,
    close_calls: AtomicUsize,
}

impl MockConnection {
    fn new(responses: Vec<Vec<RawRow>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            close_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, _sql: &str) -> Result<Vec<RawRow>, DbError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn close(&self) -> Result<(), DbError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockProvider {
    connection: Arc<MockConnection>,
}

#[async_trait]
impl DbProvider for MockProvider {
    async fn open(&self) -> Result<Arc<dyn Connection>, DbError> {
        Ok(Arc::clone(&self.connection) as Arc<dyn Connection>)
    }
}

/// Provider that fails to open, for start-failure coverage.
struct FailingProvider;

#[async_trait]
impl DbProvider for FailingProvider {
    async fn open(&self) -> Result<Arc<dyn Connection>, DbError> {
        Err(DbError::Connection("login failed for user 'sa'".into()))
    }
}

fn config() -> ScraperConfig {
    ScraperConfig::new(ConnectionConfig::new("0.0.0.0", 1433).credentials("sa", "password"))
}

fn client_provider() -> Arc<dyn ClientProvider> {
    Arc::new(SqlRowClientProvider::new(Duration::from_secs(5)))
}

fn raw_row(cells: &[(&str, &str)]) -> RawRow {
    cells
        .iter()
        .map(|(k, v)| ((*k).to_string(), Some((*v).to_string())))
        .collect()
}

async fn started_scraper(kind: QueryKind, responses: Vec<Vec<RawRow>>) -> Scraper {
    let connection = MockConnection::new(responses);
    let mut scraper = Scraper::new(
        kind,
        &config(),
        Arc::new(MockProvider { connection }),
        client_provider(),
    );
    scraper.start().await.unwrap();
    scraper
}

fn database_io_row() -> RawRow {
    raw_row(&[
        ("computer_name", "H"),
        ("database_name", "db1"),
        ("sql_instance", "I"),
        ("physical_filename", "/data/db1.mdf"),
        ("logical_filename", "db1"),
        ("file_type", "ROWS"),
        ("read_latency_ms", "1500"),
        ("write_latency_ms", "2500"),
        ("reads", "10"),
        ("writes", "20"),
        ("read_bytes", "4096"),
        ("write_bytes", "8192"),
    ])
}

fn query_stats_row(elapsed_us: &str, total_rows: &str) -> RawRow {
    raw_row(&[
        ("computer_name", "H"),
        ("sql_instance", "I"),
        ("query_hash", "0x37849E874171E3F3"),
        ("query_plan_hash", "0xD3112909429A1B50"),
        ("total_elapsed_time", elapsed_us),
        ("total_rows", total_rows),
        ("total_logical_reads", "100"),
        ("total_logical_writes", "50"),
        ("total_physical_reads", "10"),
        ("execution_count", "1"),
        ("total_worker_time", "2000"),
        ("total_grant_kb", "64"),
        ("text", "SELECT * FROM t WHERE id = 7"),
        (
            "query_plan",
            r#"<StmtSimple StatementText="SELECT * FROM t WHERE id = 7"/>"#,
        ),
    ])
}

#[tokio::test]
async fn test_database_io_scrape_end_to_end() {
    let mut scraper = started_scraper(
        QueryKind::DatabaseIo { instance_name: None },
        vec![vec![database_io_row()]],
    )
    .await;

    let scraped = scraper.scrape_metrics(&CancellationToken::new()).await.unwrap();
    assert!(scraped.error.is_none());

    let metrics = scraped.batch;
    assert_eq!(metrics.resource_metrics.len(), 1);
    assert_eq!(metrics.data_point_count(), 6);

    let resource = &metrics.resource_metrics[0].resource;
    assert_eq!(resource.computer_name(), "H");
    assert_eq!(resource.database_name(), Some("db1"));
    assert_eq!(resource.instance_name(), "I");

    let direction = |point: &mssql_records::DataPoint| {
        point
            .attributes
            .iter()
            .find(|(k, _)| *k == attrs::DIRECTION)
            .map(|(_, v)| v.clone())
            .unwrap()
    };

    let latencies: Vec<_> = metrics.points_named(names::DATABASE_LATENCY.0).collect();
    assert_eq!(
        (direction(latencies[0]), latencies[0].value),
        ("read".to_string(), MetricValue::Double(1.5))
    );
    assert_eq!(
        (direction(latencies[1]), latencies[1].value),
        ("write".to_string(), MetricValue::Double(2.5))
    );

    let operations: Vec<_> = metrics.points_named(names::DATABASE_OPERATIONS.0).collect();
    assert_eq!(operations[0].value, MetricValue::Int(10));
    assert_eq!(operations[1].value, MetricValue::Int(20));

    let io: Vec<_> = metrics.points_named(names::DATABASE_IO.0).collect();
    assert_eq!(io[0].value, MetricValue::Int(4096));
    assert_eq!(io[1].value, MetricValue::Int(8192));
}

#[tokio::test]
async fn test_perf_counters_known_and_unknown() {
    let rows = vec![
        raw_row(&[
            ("computer_name", "H"),
            ("sql_instance", "I"),
            ("counter", "User Connections"),
            ("value", "42"),
        ]),
        raw_row(&[
            ("computer_name", "H"),
            ("sql_instance", "I"),
            ("counter", "Unknown Counter"),
            ("value", "5"),
        ]),
    ];
    let mut scraper =
        started_scraper(QueryKind::PerfCounters { instance_name: None }, vec![rows]).await;

    let scraped = scraper.scrape_metrics(&CancellationToken::new()).await.unwrap();
    assert!(scraped.error.is_none());
    assert_eq!(scraped.batch.data_point_count(), 1);
    let point = scraped
        .batch
        .points_named(names::USER_CONNECTION_COUNT.0)
        .next()
        .unwrap();
    assert_eq!(point.value, MetricValue::Int(42));
}

#[tokio::test]
async fn test_server_properties_status_counts() {
    let rows = vec![raw_row(&[
        ("computer_name", "H"),
        ("sql_instance", "I"),
        ("db_online", "5"),
        ("db_restoring", "0"),
        ("db_recovering", "0"),
        ("db_recoveryPending", "0"),
        ("db_suspect", "0"),
        ("db_offline", "1"),
    ])];
    let mut scraper =
        started_scraper(QueryKind::ServerProperties { instance_name: None }, vec![rows]).await;

    let scraped = scraper.scrape_metrics(&CancellationToken::new()).await.unwrap();
    assert!(scraped.error.is_none());
    assert_eq!(scraped.batch.data_point_count(), 6);

    let statuses: Vec<(String, i64)> = scraped
        .batch
        .points_named(names::DATABASE_COUNT.0)
        .map(|p| {
            let status = p
                .attributes
                .iter()
                .find(|(k, _)| *k == attrs::STATUS)
                .map(|(_, v)| v.clone())
                .unwrap();
            (status, p.value.as_int().unwrap())
        })
        .collect();
    assert_eq!(statuses[0], ("online".to_string(), 5));
    assert_eq!(statuses[5], ("offline".to_string(), 1));
}

#[tokio::test]
async fn test_query_metrics_two_scrape_delta() {
    let kind = QueryKind::QueryMetrics {
        instance_name: None,
        params: SampleParams::default(),
    };
    let mut scraper = started_scraper(
        kind,
        vec![
            vec![query_stats_row("100000", "10")],
            vec![query_stats_row("223000", "10")],
        ],
    )
    .await;
    let cancel = CancellationToken::new();

    // First scrape primes the cache; nothing is emitted for the key.
    let scraped = scraper.scrape_metrics(&cancel).await.unwrap();
    assert!(scraped.error.is_none());
    assert!(scraped.batch.is_empty());

    // Second scrape: 123000us more elapsed -> 123ms delta.
    let scraped = scraper.scrape_metrics(&cancel).await.unwrap();
    assert!(scraped.error.is_none());
    let elapsed = scraped
        .batch
        .points_named(names::QUERY_TOTAL_ELAPSED_TIME.0)
        .next()
        .unwrap();
    assert_eq!(elapsed.value.as_double(), Some(123.0));

    let resource = &scraped.batch.resource_metrics[0].resource;
    assert_eq!(
        resource.query_hash(),
        Some(hex::encode("0x37849E874171E3F3").as_str())
    );
    assert_eq!(
        resource.query_plan_hash(),
        Some(hex::encode("0xD3112909429A1B50").as_str())
    );
}

#[tokio::test]
async fn test_query_text_and_plan_logs() {
    let kind = QueryKind::QueryTextAndPlan {
        instance_name: None,
        params: SampleParams::default(),
    };
    let mut scraper = started_scraper(
        kind,
        vec![
            vec![query_stats_row("100000", "10")],
            vec![query_stats_row("400000", "12")],
        ],
    )
    .await;
    let cancel = CancellationToken::new();

    let scraped = scraper.scrape_logs(&cancel).await.unwrap();
    assert!(scraped.batch.is_empty());

    let scraped = scraper.scrape_logs(&cancel).await.unwrap();
    assert!(scraped.error.is_none());
    assert_eq!(scraped.batch.len(), 1);

    let record = &scraped.batch[0];
    assert_eq!(record.body(), "text");
    assert_eq!(
        record.attribute("total_elapsed_time").and_then(AnyValue::as_double),
        Some(300.0)
    );
    assert_eq!(
        record.attribute("query_text").and_then(AnyValue::as_str),
        Some("SELECT * FROM t WHERE id = ?")
    );
    let plan = record
        .attribute("normalized_query_plan")
        .and_then(AnyValue::as_str)
        .unwrap();
    assert!(plan.contains(r#"StatementText="SELECT * FROM t WHERE id = ?""#));
}

#[tokio::test]
async fn test_query_samples_logs_and_dedup() {
    let sample = |session: &str, hash: &str| {
        raw_row(&[
            ("user_name", "app"),
            ("db_name", "orders"),
            ("client_address", "10.0.0.8"),
            ("client_port", ""),
            ("query_start", "2025-04-01T12:00:00"),
            ("session_id", session),
            ("session_status", "running"),
            ("host_name", "app01"),
            ("command", "SELECT"),
            ("statement_text", "SELECT 1"),
            ("blocking_session_id", "0"),
            ("wait_type", "PAGEIOLATCH_SH"),
            ("wait_time", "3"),
            ("wait_resource", ""),
            ("open_transaction_count", "0"),
            ("transaction_id", "5"),
            ("percent_complete", "0"),
            ("estimated_completion_time", "0"),
            ("cpu_time", "1"),
            ("total_elapsed_time", "2"),
            ("reads", "0"),
            ("writes", "0"),
            ("logical_reads", "0"),
            ("transaction_isolation_level", "2"),
            ("lock_timeout", ""),
            ("deadlock_priority", ""),
            ("row_count", "1"),
            ("query_hash", hash),
            ("query_plan_hash", "plan"),
            ("context_info", ""),
            ("login_name", "app"),
            ("original_login_name", "app"),
            ("object_name", ""),
        ])
    };
    let kind = QueryKind::QuerySamples {
        instance_name: None,
        params: SampleParams::default(),
    };
    let mut scraper = started_scraper(
        kind,
        vec![
            vec![sample("51", "a"), sample("52", "a")],
            vec![sample("53", "a")],
        ],
    )
    .await;
    let cancel = CancellationToken::new();

    let scraped = scraper.scrape_logs(&cancel).await.unwrap();
    assert!(scraped.error.is_none());
    assert_eq!(scraped.batch.len(), 1, "same hash pair dedups in-interval");

    let record = &scraped.batch[0];
    assert_eq!(record.body(), "sample");
    assert_eq!(record.attribute("session_id").and_then(AnyValue::as_int), Some(51));
    assert_eq!(record.attribute("client_port").and_then(AnyValue::as_int), Some(0));
    assert_eq!(record.attribute("wait_code").and_then(AnyValue::as_int), Some(6));
    assert_eq!(
        record.attribute("wait_category").and_then(AnyValue::as_str),
        Some("Buffer IO")
    );

    // The pair is still cached on the next scrape.
    let scraped = scraper.scrape_logs(&cancel).await.unwrap();
    assert!(scraped.batch.is_empty());
}

#[tokio::test]
async fn test_kind_family_mismatch_is_hard_error() {
    let mut scraper =
        started_scraper(QueryKind::DatabaseIo { instance_name: None }, Vec::new()).await;
    let err = scraper.scrape_logs(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ScrapeError::UnsupportedKind { kind: "database_io", family: "logs" }
    ));

    let kind = QueryKind::QuerySamples {
        instance_name: None,
        params: SampleParams::default(),
    };
    let mut scraper = started_scraper(kind, Vec::new()).await;
    let err = scraper.scrape_metrics(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ScrapeError::UnsupportedKind { kind: "query_samples", family: "metrics" }
    ));
}

#[tokio::test]
async fn test_scrape_before_start_fails() {
    let connection = MockConnection::new(Vec::new());
    let mut scraper = Scraper::new(
        QueryKind::DatabaseIo { instance_name: None },
        &config(),
        Arc::new(MockProvider { connection }),
        client_provider(),
    );
    let err = scraper.scrape_metrics(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ScrapeError::NotStarted));
}

#[tokio::test]
async fn test_start_failure_is_fatal_for_instance() {
    let mut scraper = Scraper::new(
        QueryKind::DatabaseIo { instance_name: None },
        &config(),
        Arc::new(FailingProvider),
        client_provider(),
    );
    let err = scraper.start().await.unwrap_err();
    assert!(matches!(err, ScrapeError::Db(DbError::Connection(_))));
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let connection = MockConnection::new(Vec::new());
    let mut scraper = Scraper::new(
        QueryKind::DatabaseIo { instance_name: None },
        &config(),
        Arc::new(MockProvider {
            connection: Arc::clone(&connection),
        }),
        client_provider(),
    );
    scraper.start().await.unwrap();

    scraper.shutdown().await.unwrap();
    scraper.shutdown().await.unwrap();
    assert_eq!(connection.close_calls.load(Ordering::SeqCst), 1);

    let err = scraper.scrape_metrics(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ScrapeError::NotStarted));
}

#[tokio::test]
async fn test_empty_result_set_is_not_an_error() {
    let mut scraper =
        started_scraper(QueryKind::DatabaseIo { instance_name: None }, vec![Vec::new()]).await;
    let scraped = scraper.scrape_metrics(&CancellationToken::new()).await.unwrap();
    assert!(scraped.error.is_none());
    assert!(scraped.batch.is_empty());
}
