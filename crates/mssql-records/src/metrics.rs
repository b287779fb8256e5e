//! Metrics batch builder.
//!
//! One named `record_*_data_point` method per metric the scraper emits.
//! Recorded points accumulate as pending until [`MetricsBatch::emit_for_resource`]
//! commits them under a resource scope; [`MetricsBatch::emit`] finishes the
//! batch. Methods taking a raw cell string parse it and surface the parse
//! failure to the caller, so a bad cell suppresses only its own data point.

use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

use crate::Timestamp;
use crate::resource::ResourceAttributes;

/// Metric names and units, as emitted downstream.
pub mod names {
    /// Seconds of I/O stall, by direction.
    pub const DATABASE_LATENCY: (&str, &str) = ("sqlserver.database.latency", "s");
    /// File operation count, by direction.
    pub const DATABASE_OPERATIONS: (&str, &str) = ("sqlserver.database.operations", "{operations}");
    /// Bytes transferred, by direction.
    pub const DATABASE_IO: (&str, &str) = ("sqlserver.database.io", "By");
    /// Batch requests per second.
    pub const BATCH_REQUEST_RATE: (&str, &str) = ("sqlserver.batch.request.rate", "{requests}/s");
    /// Buffer cache hit ratio, percent.
    pub const PAGE_BUFFER_CACHE_HIT_RATIO: (&str, &str) =
        ("sqlserver.page.buffer_cache.hit_ratio", "1");
    /// SQL compilations per second.
    pub const BATCH_SQL_COMPILATION_RATE: (&str, &str) =
        ("sqlserver.batch.sql_compilation.rate", "{compilations}/s");
    /// SQL re-compilations per second.
    pub const BATCH_SQL_RECOMPILATION_RATE: (&str, &str) = (
        "sqlserver.batch.sql_recompilation.rate",
        "{compilations}/s",
    );
    /// User connection count.
    pub const USER_CONNECTION_COUNT: (&str, &str) =
        ("sqlserver.user.connection.count", "{connections}");
    /// Lock waits per second.
    pub const LOCK_WAIT_RATE: (&str, &str) = ("sqlserver.lock.wait.rate", "{requests}/s");
    /// Number of blocked processes.
    pub const PROCESSES_BLOCKED: (&str, &str) = ("sqlserver.processes.blocked", "{processes}");
    /// Resource-pool throttled disk reads per second.
    pub const RESOURCE_POOL_DISK_THROTTLED_READ_RATE: (&str, &str) = (
        "sqlserver.resource_pool.disk.throttled.read.rate",
        "{reads}/s",
    );
    /// Resource-pool throttled disk writes per second.
    pub const RESOURCE_POOL_DISK_THROTTLED_WRITE_RATE: (&str, &str) = (
        "sqlserver.resource_pool.disk.throttled.write.rate",
        "{writes}/s",
    );
    /// Database count, by status.
    pub const DATABASE_COUNT: (&str, &str) = ("sqlserver.database.count", "{databases}");
    /// Elapsed-time delta for a ranked query, milliseconds.
    pub const QUERY_TOTAL_ELAPSED_TIME: (&str, &str) = ("sqlserver.query.total_elapsed_time", "ms");
    /// Rows-returned delta for a ranked query.
    pub const QUERY_TOTAL_ROWS: (&str, &str) = ("sqlserver.query.total_rows", "{rows}");
    /// Logical-reads delta for a ranked query.
    pub const QUERY_TOTAL_LOGICAL_READS: (&str, &str) =
        ("sqlserver.query.total_logical_reads", "{reads}");
    /// Logical-writes delta for a ranked query.
    pub const QUERY_TOTAL_LOGICAL_WRITES: (&str, &str) =
        ("sqlserver.query.total_logical_writes", "{writes}");
    /// Physical-reads delta for a ranked query.
    pub const QUERY_TOTAL_PHYSICAL_READS: (&str, &str) =
        ("sqlserver.query.total_physical_reads", "{reads}");
    /// Execution-count delta for a ranked query.
    pub const QUERY_EXECUTION_COUNT: (&str, &str) =
        ("sqlserver.query.execution_count", "{executions}");
    /// Worker-time delta for a ranked query, milliseconds.
    pub const QUERY_TOTAL_WORKER_TIME: (&str, &str) = ("sqlserver.query.total_worker_time", "ms");
    /// Memory-grant delta for a ranked query, kilobytes.
    pub const QUERY_TOTAL_GRANT_KB: (&str, &str) = ("sqlserver.query.total_grant_kb", "KiBy");
}

/// Data-point attribute keys.
pub mod attrs {
    /// Read/write direction.
    pub const DIRECTION: &str = "direction";
    /// Physical file name of a database file.
    pub const PHYSICAL_FILENAME: &str = "physical_filename";
    /// Logical file name of a database file.
    pub const LOGICAL_FILENAME: &str = "logical_filename";
    /// File type (`ROWS`, `LOG`).
    pub const FILE_TYPE: &str = "file_type";
    /// Database status bucket.
    pub const STATUS: &str = "status";
}

/// I/O direction attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Read-side value.
    Read,
    /// Write-side value.
    Write,
}

impl Direction {
    /// Attribute string emitted downstream.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Database status attribute value for `sqlserver.database.count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseStatus {
    /// Databases online.
    Online,
    /// Databases restoring.
    Restoring,
    /// Databases recovering.
    Recovering,
    /// Databases with recovery pending.
    PendingRecovery,
    /// Databases marked suspect.
    Suspect,
    /// Databases offline.
    Offline,
}

impl DatabaseStatus {
    /// Attribute string emitted downstream.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Restoring => "restoring",
            Self::Recovering => "recovering",
            Self::PendingRecovery => "pending_recovery",
            Self::Suspect => "suspect",
            Self::Offline => "offline",
        }
    }
}

/// Failure to record a data point from a raw cell value.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Integer cell failed to parse.
    #[error("invalid integer {value:?} for {metric}: {source}")]
    Int {
        /// Metric name the cell was destined for.
        metric: &'static str,
        /// The offending raw cell.
        value: String,
        /// Underlying parse failure.
        source: ParseIntError,
    },
    /// Float cell failed to parse.
    #[error("invalid number {value:?} for {metric}: {source}")]
    Float {
        /// Metric name the cell was destined for.
        metric: &'static str,
        /// The offending raw cell.
        value: String,
        /// Underlying parse failure.
        source: ParseFloatError,
    },
}

/// A recorded point value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Integer-valued point.
    Int(i64),
    /// Double-valued point.
    Double(f64),
}

impl MetricValue {
    /// Integer value, if this point is integer-valued.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Double(_) => None,
        }
    }

    /// Double value, if this point is double-valued.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(_) => None,
        }
    }
}

/// One data point pending commitment to a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    /// Metric name.
    pub name: &'static str,
    /// Metric unit.
    pub unit: &'static str,
    /// Point timestamp.
    pub timestamp: Timestamp,
    /// Point value.
    pub value: MetricValue,
    /// Point-level attributes, in recording order.
    pub attributes: Vec<(&'static str, String)>,
}

/// Data points committed under one resource scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMetrics {
    /// Resource identity for these points.
    pub resource: ResourceAttributes,
    /// Committed points, in recording order.
    pub points: Vec<DataPoint>,
}

/// A finished metrics batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    /// Per-resource point sets, in emission order.
    pub resource_metrics: Vec<ResourceMetrics>,
}

impl Metrics {
    /// Total data points across all resources.
    #[must_use]
    pub fn data_point_count(&self) -> usize {
        self.resource_metrics.iter().map(|rm| rm.points.len()).sum()
    }

    /// Whether the batch carries no data points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_point_count() == 0
    }

    /// All points for a metric name, across resources.
    pub fn points_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DataPoint> {
        self.resource_metrics
            .iter()
            .flat_map(|rm| rm.points.iter())
            .filter(move |p| p.name == name)
    }
}

/// Per-metric enable flags. Everything defaults to enabled; a disabled
/// metric's record method is a no-op.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct MetricsSettings {
    pub database_latency: bool,
    pub database_operations: bool,
    pub database_io: bool,
    pub batch_request_rate: bool,
    pub page_buffer_cache_hit_ratio: bool,
    pub batch_sql_compilation_rate: bool,
    pub batch_sql_recompilation_rate: bool,
    pub user_connection_count: bool,
    pub lock_wait_rate: bool,
    pub processes_blocked: bool,
    pub resource_pool_disk_throttled_read_rate: bool,
    pub resource_pool_disk_throttled_write_rate: bool,
    pub database_count: bool,
    pub query_total_elapsed_time: bool,
    pub query_total_rows: bool,
    pub query_total_logical_reads: bool,
    pub query_total_logical_writes: bool,
    pub query_total_physical_reads: bool,
    pub query_execution_count: bool,
    pub query_total_worker_time: bool,
    pub query_total_grant_kb: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            database_latency: true,
            database_operations: true,
            database_io: true,
            batch_request_rate: true,
            page_buffer_cache_hit_ratio: true,
            batch_sql_compilation_rate: true,
            batch_sql_recompilation_rate: true,
            user_connection_count: true,
            lock_wait_rate: true,
            processes_blocked: true,
            resource_pool_disk_throttled_read_rate: true,
            resource_pool_disk_throttled_write_rate: true,
            database_count: true,
            query_total_elapsed_time: true,
            query_total_rows: true,
            query_total_logical_reads: true,
            query_total_logical_writes: true,
            query_total_physical_reads: true,
            query_execution_count: true,
            query_total_worker_time: true,
            query_total_grant_kb: true,
        }
    }
}

impl MetricsSettings {
    /// All metrics disabled; tests flip individual flags back on.
    #[must_use]
    pub fn all_disabled() -> Self {
        Self {
            database_latency: false,
            database_operations: false,
            database_io: false,
            batch_request_rate: false,
            page_buffer_cache_hit_ratio: false,
            batch_sql_compilation_rate: false,
            batch_sql_recompilation_rate: false,
            user_connection_count: false,
            lock_wait_rate: false,
            processes_blocked: false,
            resource_pool_disk_throttled_read_rate: false,
            resource_pool_disk_throttled_write_rate: false,
            database_count: false,
            query_total_elapsed_time: false,
            query_total_rows: false,
            query_total_logical_reads: false,
            query_total_logical_writes: false,
            query_total_physical_reads: false,
            query_execution_count: false,
            query_total_worker_time: false,
            query_total_grant_kb: false,
        }
    }

}

/// Accumulating metrics builder.
///
/// Pending points are committed to a resource with
/// [`emit_for_resource`](Self::emit_for_resource); the whole batch is
/// finished with [`emit`](Self::emit), which resets the builder.
#[derive(Debug, Default)]
pub struct MetricsBatch {
    settings: MetricsSettings,
    pending: Vec<DataPoint>,
    emitted: Vec<ResourceMetrics>,
}

impl MetricsBatch {
    /// Create a builder with all metrics enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(MetricsSettings::default())
    }

    /// Create a builder with explicit enable flags.
    #[must_use]
    pub fn with_settings(settings: MetricsSettings) -> Self {
        Self {
            settings,
            pending: Vec::new(),
            emitted: Vec::new(),
        }
    }

    /// Number of points recorded but not yet committed to a resource.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn push(
        &mut self,
        enabled: bool,
        meta: (&'static str, &'static str),
        timestamp: Timestamp,
        value: MetricValue,
        attributes: Vec<(&'static str, String)>,
    ) {
        if !enabled {
            return;
        }
        self.pending.push(DataPoint {
            name: meta.0,
            unit: meta.1,
            timestamp,
            value,
            attributes,
        });
    }

    fn parse_int(meta: (&'static str, &'static str), raw: &str) -> Result<i64, RecordError> {
        raw.parse::<i64>().map_err(|source| RecordError::Int {
            metric: meta.0,
            value: raw.to_string(),
            source,
        })
    }

    fn parse_float(meta: (&'static str, &'static str), raw: &str) -> Result<f64, RecordError> {
        raw.parse::<f64>().map_err(|source| RecordError::Float {
            metric: meta.0,
            value: raw.to_string(),
            source,
        })
    }

    fn file_attrs(
        physical_filename: &str,
        logical_filename: &str,
        file_type: &str,
        direction: Direction,
    ) -> Vec<(&'static str, String)> {
        vec![
            (attrs::PHYSICAL_FILENAME, physical_filename.to_string()),
            (attrs::LOGICAL_FILENAME, logical_filename.to_string()),
            (attrs::FILE_TYPE, file_type.to_string()),
            (attrs::DIRECTION, direction.as_str().to_string()),
        ]
    }

    /// Record `sqlserver.database.latency` (seconds).
    pub fn record_database_latency_data_point(
        &mut self,
        timestamp: Timestamp,
        seconds: f64,
        physical_filename: &str,
        logical_filename: &str,
        file_type: &str,
        direction: Direction,
    ) {
        let enabled = self.settings.database_latency;
        self.push(
            enabled,
            names::DATABASE_LATENCY,
            timestamp,
            MetricValue::Double(seconds),
            Self::file_attrs(physical_filename, logical_filename, file_type, direction),
        );
    }

    /// Record `sqlserver.database.operations` from a raw cell.
    pub fn record_database_operations_data_point(
        &mut self,
        timestamp: Timestamp,
        raw: &str,
        physical_filename: &str,
        logical_filename: &str,
        file_type: &str,
        direction: Direction,
    ) -> Result<(), RecordError> {
        let value = Self::parse_int(names::DATABASE_OPERATIONS, raw)?;
        let enabled = self.settings.database_operations;
        self.push(
            enabled,
            names::DATABASE_OPERATIONS,
            timestamp,
            MetricValue::Int(value),
            Self::file_attrs(physical_filename, logical_filename, file_type, direction),
        );
        Ok(())
    }

    /// Record `sqlserver.database.io` from a raw cell.
    pub fn record_database_io_data_point(
        &mut self,
        timestamp: Timestamp,
        raw: &str,
        physical_filename: &str,
        logical_filename: &str,
        file_type: &str,
        direction: Direction,
    ) -> Result<(), RecordError> {
        let value = Self::parse_int(names::DATABASE_IO, raw)?;
        let enabled = self.settings.database_io;
        self.push(
            enabled,
            names::DATABASE_IO,
            timestamp,
            MetricValue::Int(value),
            Self::file_attrs(physical_filename, logical_filename, file_type, direction),
        );
        Ok(())
    }

    /// Record `sqlserver.batch.request.rate`.
    pub fn record_batch_request_rate_data_point(&mut self, timestamp: Timestamp, value: f64) {
        let enabled = self.settings.batch_request_rate;
        self.push(
            enabled,
            names::BATCH_REQUEST_RATE,
            timestamp,
            MetricValue::Double(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.page.buffer_cache.hit_ratio`.
    pub fn record_page_buffer_cache_hit_ratio_data_point(
        &mut self,
        timestamp: Timestamp,
        value: f64,
    ) {
        let enabled = self.settings.page_buffer_cache_hit_ratio;
        self.push(
            enabled,
            names::PAGE_BUFFER_CACHE_HIT_RATIO,
            timestamp,
            MetricValue::Double(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.batch.sql_compilation.rate`.
    pub fn record_batch_sql_compilation_rate_data_point(
        &mut self,
        timestamp: Timestamp,
        value: f64,
    ) {
        let enabled = self.settings.batch_sql_compilation_rate;
        self.push(
            enabled,
            names::BATCH_SQL_COMPILATION_RATE,
            timestamp,
            MetricValue::Double(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.batch.sql_recompilation.rate`.
    pub fn record_batch_sql_recompilation_rate_data_point(
        &mut self,
        timestamp: Timestamp,
        value: f64,
    ) {
        let enabled = self.settings.batch_sql_recompilation_rate;
        self.push(
            enabled,
            names::BATCH_SQL_RECOMPILATION_RATE,
            timestamp,
            MetricValue::Double(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.user.connection.count`.
    pub fn record_user_connection_count_data_point(&mut self, timestamp: Timestamp, value: i64) {
        let enabled = self.settings.user_connection_count;
        self.push(
            enabled,
            names::USER_CONNECTION_COUNT,
            timestamp,
            MetricValue::Int(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.lock.wait.rate`.
    pub fn record_lock_wait_rate_data_point(&mut self, timestamp: Timestamp, value: f64) {
        let enabled = self.settings.lock_wait_rate;
        self.push(
            enabled,
            names::LOCK_WAIT_RATE,
            timestamp,
            MetricValue::Double(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.processes.blocked` from a raw cell.
    pub fn record_processes_blocked_data_point(
        &mut self,
        timestamp: Timestamp,
        raw: &str,
    ) -> Result<(), RecordError> {
        let value = Self::parse_int(names::PROCESSES_BLOCKED, raw)?;
        let enabled = self.settings.processes_blocked;
        self.push(
            enabled,
            names::PROCESSES_BLOCKED,
            timestamp,
            MetricValue::Int(value),
            Vec::new(),
        );
        Ok(())
    }

    /// Record `sqlserver.resource_pool.disk.throttled.read.rate` from a raw cell.
    pub fn record_resource_pool_disk_throttled_read_rate_data_point(
        &mut self,
        timestamp: Timestamp,
        raw: &str,
    ) -> Result<(), RecordError> {
        let value = Self::parse_int(names::RESOURCE_POOL_DISK_THROTTLED_READ_RATE, raw)?;
        let enabled = self.settings.resource_pool_disk_throttled_read_rate;
        self.push(
            enabled,
            names::RESOURCE_POOL_DISK_THROTTLED_READ_RATE,
            timestamp,
            MetricValue::Int(value),
            Vec::new(),
        );
        Ok(())
    }

    /// Record `sqlserver.resource_pool.disk.throttled.write.rate` from a raw cell.
    pub fn record_resource_pool_disk_throttled_write_rate_data_point(
        &mut self,
        timestamp: Timestamp,
        raw: &str,
    ) -> Result<(), RecordError> {
        let value = Self::parse_int(names::RESOURCE_POOL_DISK_THROTTLED_WRITE_RATE, raw)?;
        let enabled = self.settings.resource_pool_disk_throttled_write_rate;
        self.push(
            enabled,
            names::RESOURCE_POOL_DISK_THROTTLED_WRITE_RATE,
            timestamp,
            MetricValue::Int(value),
            Vec::new(),
        );
        Ok(())
    }

    /// Record `sqlserver.database.count` for one status bucket from a raw cell.
    pub fn record_database_count_data_point(
        &mut self,
        timestamp: Timestamp,
        raw: &str,
        status: DatabaseStatus,
    ) -> Result<(), RecordError> {
        let value = Self::parse_int(names::DATABASE_COUNT, raw)?;
        let enabled = self.settings.database_count;
        self.push(
            enabled,
            names::DATABASE_COUNT,
            timestamp,
            MetricValue::Int(value),
            vec![(attrs::STATUS, status.as_str().to_string())],
        );
        Ok(())
    }

    /// Record `sqlserver.query.total_elapsed_time` (milliseconds).
    pub fn record_query_total_elapsed_time_data_point(
        &mut self,
        timestamp: Timestamp,
        millis: f64,
    ) {
        let enabled = self.settings.query_total_elapsed_time;
        self.push(
            enabled,
            names::QUERY_TOTAL_ELAPSED_TIME,
            timestamp,
            MetricValue::Double(millis),
            Vec::new(),
        );
    }

    /// Record `sqlserver.query.total_rows`.
    pub fn record_query_total_rows_data_point(&mut self, timestamp: Timestamp, value: i64) {
        let enabled = self.settings.query_total_rows;
        self.push(
            enabled,
            names::QUERY_TOTAL_ROWS,
            timestamp,
            MetricValue::Int(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.query.total_logical_reads`.
    pub fn record_query_total_logical_reads_data_point(
        &mut self,
        timestamp: Timestamp,
        value: i64,
    ) {
        let enabled = self.settings.query_total_logical_reads;
        self.push(
            enabled,
            names::QUERY_TOTAL_LOGICAL_READS,
            timestamp,
            MetricValue::Int(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.query.total_logical_writes`.
    pub fn record_query_total_logical_writes_data_point(
        &mut self,
        timestamp: Timestamp,
        value: i64,
    ) {
        let enabled = self.settings.query_total_logical_writes;
        self.push(
            enabled,
            names::QUERY_TOTAL_LOGICAL_WRITES,
            timestamp,
            MetricValue::Int(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.query.total_physical_reads`.
    pub fn record_query_total_physical_reads_data_point(
        &mut self,
        timestamp: Timestamp,
        value: i64,
    ) {
        let enabled = self.settings.query_total_physical_reads;
        self.push(
            enabled,
            names::QUERY_TOTAL_PHYSICAL_READS,
            timestamp,
            MetricValue::Int(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.query.execution_count`.
    pub fn record_query_execution_count_data_point(&mut self, timestamp: Timestamp, value: f64) {
        let enabled = self.settings.query_execution_count;
        self.push(
            enabled,
            names::QUERY_EXECUTION_COUNT,
            timestamp,
            MetricValue::Double(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.query.total_worker_time` (milliseconds).
    pub fn record_query_total_worker_time_data_point(&mut self, timestamp: Timestamp, value: f64) {
        let enabled = self.settings.query_total_worker_time;
        self.push(
            enabled,
            names::QUERY_TOTAL_WORKER_TIME,
            timestamp,
            MetricValue::Double(value),
            Vec::new(),
        );
    }

    /// Record `sqlserver.query.total_grant_kb`.
    pub fn record_query_total_grant_kb_data_point(&mut self, timestamp: Timestamp, value: f64) {
        let enabled = self.settings.query_total_grant_kb;
        self.push(
            enabled,
            names::QUERY_TOTAL_GRANT_KB,
            timestamp,
            MetricValue::Double(value),
            Vec::new(),
        );
    }

    /// Commit all pending points under the given resource.
    ///
    /// A commit with no pending points is a no-op, so rows whose every cell
    /// failed to parse do not produce an empty resource scope.
    pub fn emit_for_resource(&mut self, resource: ResourceAttributes) {
        if self.pending.is_empty() {
            return;
        }
        self.emitted.push(ResourceMetrics {
            resource,
            points: std::mem::take(&mut self.pending),
        });
    }

    /// Finish the batch, returning everything committed so far and
    /// resetting the builder for the next scrape.
    pub fn emit(&mut self) -> Metrics {
        self.pending.clear();
        Metrics {
            resource_metrics: std::mem::take(&mut self.emitted),
        }
    }
}
