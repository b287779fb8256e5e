//! Shared ranking for the top-query mappers.
//!
//! Both ranked mappers order rows by their elapsed-time delta since the
//! previous scrape. Row and delta travel as one pair through a single
//! sort, so the ordering cannot drift between two parallel arrays.

use mssql_records::Row;

use crate::cache::{CounterCache, cache_and_diff};

pub(crate) const QUERY_HASH_COL: &str = "query_hash";
pub(crate) const QUERY_PLAN_HASH_COL: &str = "query_plan_hash";
pub(crate) const TOTAL_ELAPSED_TIME_COL: &str = "total_elapsed_time";

/// A row joined with its hex-encoded hashes and elapsed-time delta.
pub(crate) struct RankedRow<'a> {
    pub row: &'a Row,
    pub query_hash: String,
    pub query_plan_hash: String,
    /// Elapsed-time delta in milliseconds; zero when the key was not
    /// cached or made no progress.
    pub elapsed_delta_ms: i64,
}

/// Diff every row's `total_elapsed_time` against the cache and sort
/// descending by delta. The sort is stable, so ties keep input order.
pub(crate) fn rank_rows_by_elapsed<'a>(
    rows: &'a [Row],
    cache: &mut Option<CounterCache>,
) -> Vec<RankedRow<'a>> {
    let mut ranked: Vec<RankedRow<'a>> = rows
        .iter()
        .map(|row| {
            let query_hash = hex::encode(row.col(QUERY_HASH_COL).as_bytes());
            let query_plan_hash = hex::encode(row.col(QUERY_PLAN_HASH_COL).as_bytes());

            let mut elapsed_delta_ms = 0i64;
            match row.col(TOTAL_ELAPSED_TIME_COL).parse::<f64>() {
                // The server reports microseconds; the cache stores milliseconds.
                Ok(elapsed_us) => {
                    let (cached, diff) = cache_and_diff(
                        cache,
                        &query_hash,
                        &query_plan_hash,
                        TOTAL_ELAPSED_TIME_COL,
                        (elapsed_us / 1000.0) as i64,
                    );
                    if cached && diff > 0 {
                        elapsed_delta_ms = diff;
                    }
                }
                Err(error) => {
                    tracing::info!(
                        column = TOTAL_ELAPSED_TIME_COL,
                        %error,
                        "failed to parse elapsed time, row will not be ranked"
                    );
                }
            }

            RankedRow {
                row,
                query_hash,
                query_plan_hash,
                elapsed_delta_ms,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.elapsed_delta_ms.cmp(&a.elapsed_delta_ms));
    ranked
}
