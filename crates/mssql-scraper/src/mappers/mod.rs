//! Row-to-record mappers, one per query kind.
//!
//! Mappers consume materialized rows, build one resource per
//! distinguishing key, and emit data points or log records at the common
//! scrape-start timestamp. Parse failures suppress only their own data
//! point and are collected into the joined error the scrape returns.
//! Cancellation is checked between rows; a canceled mapper returns what
//! it built so far.

pub(crate) mod database_io;
pub(crate) mod perf_counters;
pub(crate) mod properties;
pub(crate) mod query_stats;
mod rank;
pub(crate) mod samples;

/// Column carrying the machine host name in every catalog query.
pub(crate) const COMPUTER_NAME_COL: &str = "computer_name";
/// Column carrying the normalized `@@SERVERNAME` in every catalog query.
pub(crate) const INSTANCE_NAME_COL: &str = "sql_instance";
