//! Database client adapter.
//!
//! The real driver lives behind the [`Connection`] seam; the scraper only
//! sees materialized rows of strings. [`SqlRowClient`] is the default
//! [`DbClient`]: it executes the prepared query text over the connection,
//! enforces the query deadline, and blanks NULL cells to empty strings
//! while counting them, so the mapper can log a null-value warning without
//! aborting the scrape.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use mssql_records::Row;

/// Errors from the database adapter.
#[derive(Debug, Error)]
pub enum DbError {
    /// Opening the connection failed.
    #[error("failed to open database connection: {0}")]
    Connection(String),

    /// The server rejected or aborted the query (including the
    /// `RAISERROR` edition guard inside the catalog queries).
    #[error("query execution failed: {0}")]
    Query(String),

    /// The query deadline expired; the in-flight query was canceled.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// The scrape was canceled while the query was in flight.
    #[error("query canceled")]
    Canceled,
}

/// A raw driver row: `(column, cell)` pairs in projection order, with NULL
/// cells as `None`.
pub type RawRow = Vec<(String, Option<String>)>;

/// Minimal connection surface the scraper needs from the driver.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a T-SQL batch and materialize every result row.
    async fn query(&self, sql: &str) -> Result<Vec<RawRow>, DbError>;

    /// Close the connection. Called once from scraper shutdown.
    async fn close(&self) -> Result<(), DbError>;
}

/// Opens connections for a scraper instance at `start`.
#[async_trait]
pub trait DbProvider: Send + Sync {
    /// Open a new connection.
    async fn open(&self) -> Result<Arc<dyn Connection>, DbError>;
}

/// Materialized rows plus the count of NULL cells blanked along the way.
///
/// NULL cells are a partial-success condition: the rows stay usable, the
/// caller decides whether to log.
#[derive(Debug, Default)]
pub struct RowSet {
    /// The materialized rows.
    pub rows: Vec<Row>,
    /// How many NULL cells were blanked to empty strings.
    pub null_cells: usize,
}

impl RowSet {
    /// Whether any NULL cell was blanked.
    #[must_use]
    pub fn has_null_values(&self) -> bool {
        self.null_cells > 0
    }
}

/// Executes one prepared query and returns its rows.
#[async_trait]
pub trait DbClient: Send + Sync {
    /// Run the query and materialize all rows.
    ///
    /// Honors `cancel` and the client's own deadline; no retries at this
    /// layer.
    async fn query_rows(&self, cancel: &CancellationToken) -> Result<RowSet, DbError>;
}

/// Builds a [`DbClient`] for a connection and prepared query text.
pub trait ClientProvider: Send + Sync {
    /// Wrap `connection` and `sql` into a client.
    fn client(&self, connection: Arc<dyn Connection>, sql: String) -> Box<dyn DbClient>;
}

/// Default [`DbClient`] over a [`Connection`].
pub struct SqlRowClient {
    connection: Arc<dyn Connection>,
    sql: String,
    timeout: Duration,
}

impl SqlRowClient {
    /// Create a client for the given connection and query text.
    #[must_use]
    pub fn new(connection: Arc<dyn Connection>, sql: String, timeout: Duration) -> Self {
        Self {
            connection,
            sql,
            timeout,
        }
    }

    /// The prepared query text this client executes.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[async_trait]
impl DbClient for SqlRowClient {
    async fn query_rows(&self, cancel: &CancellationToken) -> Result<RowSet, DbError> {
        let raw_rows = tokio::select! {
            () = cancel.cancelled() => return Err(DbError::Canceled),
            result = tokio::time::timeout(self.timeout, self.connection.query(&self.sql)) => {
                result.map_err(|_| DbError::Timeout(self.timeout))??
            }
        };

        let mut null_cells = 0usize;
        let rows = raw_rows
            .into_iter()
            .map(|raw| {
                raw.into_iter()
                    .map(|(column, cell)| {
                        let cell = cell.unwrap_or_else(|| {
                            null_cells += 1;
                            String::new()
                        });
                        (column, cell)
                    })
                    .collect::<Row>()
            })
            .collect();

        Ok(RowSet { rows, null_cells })
    }
}

/// [`ClientProvider`] producing [`SqlRowClient`]s with a fixed deadline.
#[derive(Debug, Clone)]
pub struct SqlRowClientProvider {
    timeout: Duration,
}

impl SqlRowClientProvider {
    /// Create a provider with the given per-query deadline.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ClientProvider for SqlRowClientProvider {
    fn client(&self, connection: Arc<dyn Connection>, sql: String) -> Box<dyn DbClient> {
        Box::new(SqlRowClient::new(connection, sql, self.timeout))
    }
}
