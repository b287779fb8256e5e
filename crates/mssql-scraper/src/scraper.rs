//! Scraper orchestrator: lifecycle and per-kind dispatch.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use mssql_queries::{QueryKind, query_for};
use mssql_records::{LogRecord, LogsBatch, Metrics, MetricsBatch, Timestamp};

use crate::adapter::{ClientProvider, Connection, DbClient, DbProvider};
use crate::cache::CounterCache;
use crate::config::ScraperConfig;
use crate::error::{ScrapeError, Scraped};
use crate::mappers;

/// One scraper instance: one query kind against one SQL Server target.
///
/// Constructed cold; [`start`](Self::start) opens the connection through
/// the injected providers, [`shutdown`](Self::shutdown) closes it and is
/// idempotent. Between the two, each `scrape_*` call runs one
/// fetch-then-map cycle: `Idle -> Fetching -> Mapping -> Idle`, where
/// mapping never touches the network.
pub struct Scraper {
    kind: QueryKind,
    query: String,
    top_query_count: u32,
    db_provider: Arc<dyn DbProvider>,
    client_provider: Arc<dyn ClientProvider>,
    db: Option<Arc<dyn Connection>>,
    client: Option<Box<dyn DbClient>>,
    metrics: MetricsBatch,
    cache: Option<CounterCache>,
}

impl Scraper {
    /// Create a scraper for `kind`.
    ///
    /// The query text is resolved from the catalog once, here. Kinds that
    /// rank or deduplicate get their own counter cache sized from the
    /// configuration; caches are never shared between instances.
    #[must_use]
    pub fn new(
        kind: QueryKind,
        config: &ScraperConfig,
        db_provider: Arc<dyn DbProvider>,
        client_provider: Arc<dyn ClientProvider>,
    ) -> Self {
        let query = query_for(&kind);
        let cache = match kind {
            QueryKind::QueryMetrics { .. }
            | QueryKind::QueryTextAndPlan { .. }
            | QueryKind::QuerySamples { .. } => {
                Some(CounterCache::new(config.effective_cache_capacity()))
            }
            _ => None,
        };

        Self {
            kind,
            query,
            top_query_count: config.top_query_count,
            db_provider,
            client_provider,
            db: None,
            client: None,
            metrics: MetricsBatch::with_settings(config.metrics.clone()),
            cache,
        }
    }

    /// The query kind this instance scrapes.
    #[must_use]
    pub fn kind(&self) -> &QueryKind {
        &self.kind
    }

    /// The resolved T-SQL text this instance executes.
    #[must_use]
    pub fn query_text(&self) -> &str {
        &self.query
    }

    /// Open the database connection and build the row client.
    pub async fn start(&mut self) -> Result<(), ScrapeError> {
        let db = self.db_provider.open().await?;
        self.client = Some(
            self.client_provider
                .client(Arc::clone(&db), self.query.clone()),
        );
        self.db = Some(db);
        tracing::debug!(kind = self.kind.name(), "scraper started");
        Ok(())
    }

    /// Close the database connection. Idempotent.
    pub async fn shutdown(&mut self) -> Result<(), ScrapeError> {
        self.client = None;
        if let Some(db) = self.db.take() {
            db.close().await?;
            tracing::debug!(kind = self.kind.name(), "scraper shut down");
        }
        Ok(())
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<mssql_records::Row>, ScrapeError> {
        let client = self.client.as_ref().ok_or(ScrapeError::NotStarted)?;
        let row_set = client.query_rows(cancel).await?;
        if row_set.has_null_values() {
            tracing::warn!(
                kind = self.kind.name(),
                null_cells = row_set.null_cells,
                "null cells encountered while fetching rows"
            );
        }
        Ok(row_set.rows)
    }

    /// Run one metrics scrape cycle.
    ///
    /// Dispatches on the query kind; log-producing kinds are a hard
    /// error. The returned batch carries everything built before any
    /// partial failure or cancellation.
    pub async fn scrape_metrics(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Scraped<Metrics>, ScrapeError> {
        let kind = self.kind.clone();
        if !kind.emits_metrics() {
            return Err(ScrapeError::UnsupportedKind {
                kind: kind.name(),
                family: "metrics",
            });
        }

        let now = Timestamp::now();
        let rows = self.fetch(cancel).await?;

        let error = match &kind {
            QueryKind::DatabaseIo { .. } => mappers::database_io::record_database_io_metrics(
                &mut self.metrics,
                &rows,
                now,
                cancel,
            ),
            QueryKind::PerfCounters { .. } => mappers::perf_counters::record_perf_counter_metrics(
                &mut self.metrics,
                &rows,
                now,
                cancel,
            ),
            QueryKind::ServerProperties { .. } => {
                mappers::properties::record_database_status_metrics(
                    &mut self.metrics,
                    &rows,
                    now,
                    cancel,
                )
            }
            _ => mappers::query_stats::record_query_metrics(
                &mut self.metrics,
                &mut self.cache,
                &rows,
                now,
                self.top_query_count,
                cancel,
            ),
        };

        Ok(Scraped {
            batch: self.metrics.emit(),
            error,
        })
    }

    /// Run one logs scrape cycle.
    ///
    /// Dispatches on the query kind; metric-producing kinds are a hard
    /// error.
    pub async fn scrape_logs(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Scraped<Vec<LogRecord>>, ScrapeError> {
        let kind = self.kind.clone();
        if !kind.emits_logs() {
            return Err(ScrapeError::UnsupportedKind {
                kind: kind.name(),
                family: "logs",
            });
        }

        let now = Timestamp::now();
        let rows = self.fetch(cancel).await?;

        let mut logs = LogsBatch::new();
        let error = match &kind {
            QueryKind::QueryTextAndPlan { .. } => mappers::query_stats::record_query_text_and_plan(
                &mut logs,
                &mut self.cache,
                &rows,
                now,
                self.top_query_count,
                cancel,
            ),
            _ => mappers::samples::record_query_samples(
                &mut logs,
                &mut self.cache,
                &rows,
                now,
                cancel,
            ),
        };

        Ok(Scraped {
            batch: logs.emit(),
            error,
        })
    }
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("kind", &self.kind.name())
            .field("started", &self.client.is_some())
            .field("has_cache", &self.cache.is_some())
            .finish()
    }
}
