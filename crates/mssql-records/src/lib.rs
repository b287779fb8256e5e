//! # mssql-records
//!
//! Record data model for SQL Server telemetry scraping.
//!
//! This crate is the seam between the scraper core and the downstream
//! pipeline: it provides the row representation returned by the database
//! adapter and the batch builders the mappers feed. Batches are opaque to
//! the scraper beyond the `record_*_data_point` / `emit_for_resource`
//! surface, so a different pipeline implementation can be swapped in
//! without touching the mappers.
//!
//! ## Structure
//!
//! - [`Row`]: insertion-ordered `column name -> raw cell` map
//! - [`ResourceAttributes`]: the `sqlserver.*` resource identity attached
//!   to every emission
//! - [`MetricsBatch`]: one named record method per metric, committed per
//!   resource
//! - [`LogsBatch`] / [`LogRecord`]: attribute-map log records

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod logs;
pub mod metrics;
pub mod resource;
pub mod row;

pub use logs::{AnyValue, LogRecord, LogsBatch};
pub use metrics::{
    DataPoint, DatabaseStatus, Direction, MetricValue, Metrics, MetricsBatch, MetricsSettings,
    RecordError, ResourceMetrics,
};
pub use resource::ResourceAttributes;
pub use row::Row;

/// Timestamp carried on every data point and log record.
///
/// Stored as nanoseconds since the Unix epoch, mirroring the downstream
/// pipeline's wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from raw nanoseconds since the Unix epoch.
    #[must_use]
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Create a timestamp for the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self(nanos)
    }

    /// Raw nanoseconds since the Unix epoch.
    #[must_use]
    pub fn as_nanos(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_from_nanos_roundtrip() {
        let ts = Timestamp::from_nanos(1_700_000_000_000_000_000);
        assert_eq!(ts.as_nanos(), 1_700_000_000_000_000_000);
    }

    #[test]
    fn test_timestamp_now_is_nonzero() {
        assert!(Timestamp::now().as_nanos() > 0);
    }
}
