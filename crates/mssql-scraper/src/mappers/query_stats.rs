//! Ranked top-query mappers.
//!
//! Both mappers share the ranking algorithm: diff every row's cumulative
//! `total_elapsed_time` against the counter cache, sort descending by the
//! delta, and keep the first `top_n` rows with positive deltas. The
//! metrics mapper emits a counter delta only when it is strictly
//! positive; the text-and-plan mapper reports every cached delta so a
//! stalled query still shows up next to its statement text.

use tokio_util::sync::CancellationToken;

use mssql_obfuscate::{obfuscate_sql, obfuscate_xml_plan};
use mssql_records::{LogRecord, LogsBatch, MetricsBatch, ResourceAttributes, Timestamp};
use mssql_records::Row;

use crate::cache::{CounterCache, cache_and_diff};
use crate::error::{CellParseError, JoinedErrors, ScrapeError};
use crate::mappers::rank::{
    QUERY_HASH_COL, QUERY_PLAN_HASH_COL, RankedRow, TOTAL_ELAPSED_TIME_COL, rank_rows_by_elapsed,
};
use crate::mappers::{COMPUTER_NAME_COL, INSTANCE_NAME_COL};

const TOTAL_ROWS_COL: &str = "total_rows";
const TOTAL_LOGICAL_READS_COL: &str = "total_logical_reads";
const TOTAL_LOGICAL_WRITES_COL: &str = "total_logical_writes";
const TOTAL_PHYSICAL_READS_COL: &str = "total_physical_reads";
const EXECUTION_COUNT_COL: &str = "execution_count";
const TOTAL_WORKER_TIME_COL: &str = "total_worker_time";
const TOTAL_GRANT_KB_COL: &str = "total_grant_kb";
const TEXT_COL: &str = "text";
const QUERY_PLAN_COL: &str = "query_plan";

const INT_COUNTER_COLS: [&str; 4] = [
    TOTAL_ROWS_COL,
    TOTAL_LOGICAL_READS_COL,
    TOTAL_LOGICAL_WRITES_COL,
    TOTAL_PHYSICAL_READS_COL,
];

/// Diff an integer counter column for one ranked row.
fn diff_int_column(
    ranked: &RankedRow<'_>,
    cache: &mut Option<CounterCache>,
    column: &'static str,
    row_index: usize,
    errs: &mut JoinedErrors,
) -> Option<(bool, i64)> {
    match ranked.row.col(column).parse::<i64>() {
        Ok(value) => Some(cache_and_diff(
            cache,
            &ranked.query_hash,
            &ranked.query_plan_hash,
            column,
            value,
        )),
        Err(source) => {
            errs.push(CellParseError::new(
                row_index,
                column,
                ranked.row.col(column),
                source,
            ));
            None
        }
    }
}

/// Diff a float counter column for one ranked row. `scale` converts the
/// raw value before caching (`1e-3` for the microsecond columns).
fn diff_float_column(
    ranked: &RankedRow<'_>,
    cache: &mut Option<CounterCache>,
    column: &'static str,
    scale: f64,
    row_index: usize,
    errs: &mut JoinedErrors,
) -> Option<(bool, i64)> {
    match ranked.row.col(column).parse::<f64>() {
        Ok(value) => Some(cache_and_diff(
            cache,
            &ranked.query_hash,
            &ranked.query_plan_hash,
            column,
            (value * scale) as i64,
        )),
        Err(source) => {
            errs.push(CellParseError::new(
                row_index,
                column,
                ranked.row.col(column),
                source,
            ));
            None
        }
    }
}

pub(crate) fn record_query_metrics(
    mb: &mut MetricsBatch,
    cache: &mut Option<CounterCache>,
    rows: &[Row],
    now: Timestamp,
    top_n: u32,
    cancel: &CancellationToken,
) -> Option<ScrapeError> {
    let mut errs = JoinedErrors::default();
    let ranked = rank_rows_by_elapsed(rows, cache);

    for (i, rr) in ranked.iter().enumerate() {
        if i >= top_n as usize {
            break;
        }
        // Not cached yet, or no progress since the last scrape.
        if rr.elapsed_delta_ms <= 0 {
            continue;
        }
        if cancel.is_cancelled() {
            errs.push(ScrapeError::Canceled);
            break;
        }

        let resource = ResourceAttributes::new(
            rr.row.col(COMPUTER_NAME_COL),
            rr.row.col(INSTANCE_NAME_COL),
        )
        .with_query_hashes(rr.query_hash.clone(), rr.query_plan_hash.clone());
        tracing::debug!(
            query_hash = %rr.query_hash,
            query_plan_hash = %rr.query_plan_hash,
            delta_ms = rr.elapsed_delta_ms,
            "emitting ranked query metrics"
        );

        mb.record_query_total_elapsed_time_data_point(now, rr.elapsed_delta_ms as f64);

        for column in INT_COUNTER_COLS {
            if let Some((cached, diff)) = diff_int_column(rr, cache, column, i, &mut errs) {
                if cached && diff > 0 {
                    match column {
                        TOTAL_ROWS_COL => mb.record_query_total_rows_data_point(now, diff),
                        TOTAL_LOGICAL_READS_COL => {
                            mb.record_query_total_logical_reads_data_point(now, diff);
                        }
                        TOTAL_LOGICAL_WRITES_COL => {
                            mb.record_query_total_logical_writes_data_point(now, diff);
                        }
                        _ => mb.record_query_total_physical_reads_data_point(now, diff),
                    }
                }
            }
        }

        if let Some((cached, diff)) =
            diff_float_column(rr, cache, EXECUTION_COUNT_COL, 1.0, i, &mut errs)
        {
            if cached && diff > 0 {
                mb.record_query_execution_count_data_point(now, diff as f64);
            }
        }
        if let Some((cached, diff)) =
            diff_float_column(rr, cache, TOTAL_WORKER_TIME_COL, 1e-3, i, &mut errs)
        {
            if cached && diff > 0 {
                mb.record_query_total_worker_time_data_point(now, diff as f64);
            }
        }
        if let Some((cached, diff)) =
            diff_float_column(rr, cache, TOTAL_GRANT_KB_COL, 1.0, i, &mut errs)
        {
            if cached && diff > 0 {
                mb.record_query_total_grant_kb_data_point(now, diff as f64);
            }
        }

        mb.emit_for_resource(resource);
    }

    errs.into_error()
}

pub(crate) fn record_query_text_and_plan(
    logs: &mut LogsBatch,
    cache: &mut Option<CounterCache>,
    rows: &[Row],
    now: Timestamp,
    top_n: u32,
    cancel: &CancellationToken,
) -> Option<ScrapeError> {
    let mut errs = JoinedErrors::default();
    let ranked = rank_rows_by_elapsed(rows, cache);

    for (i, rr) in ranked.iter().enumerate() {
        if i >= top_n as usize {
            break;
        }
        if rr.elapsed_delta_ms <= 0 {
            continue;
        }
        if cancel.is_cancelled() {
            errs.push(ScrapeError::Canceled);
            break;
        }

        let mut record = LogRecord::new(now);
        record.put_str(COMPUTER_NAME_COL, rr.row.col(COMPUTER_NAME_COL));
        record.put_str(INSTANCE_NAME_COL, rr.row.col(INSTANCE_NAME_COL));
        record.put_str(QUERY_HASH_COL, rr.query_hash.clone());
        record.put_str(QUERY_PLAN_HASH_COL, rr.query_plan_hash.clone());
        record.put_double(TOTAL_ELAPSED_TIME_COL, rr.elapsed_delta_ms as f64);

        for column in INT_COUNTER_COLS {
            if let Some((cached, diff)) = diff_int_column(rr, cache, column, i, &mut errs) {
                // Cached is enough here: a zero delta is still reported so
                // the statement context stays complete.
                if cached {
                    record.put_int(column, diff);
                }
            }
        }
        if let Some((cached, diff)) =
            diff_float_column(rr, cache, EXECUTION_COUNT_COL, 1.0, i, &mut errs)
        {
            if cached {
                record.put_double(EXECUTION_COUNT_COL, diff as f64);
            }
        }
        if let Some((cached, diff)) =
            diff_float_column(rr, cache, TOTAL_WORKER_TIME_COL, 1e-3, i, &mut errs)
        {
            if cached {
                record.put_double(TOTAL_WORKER_TIME_COL, diff as f64);
            }
        }
        if let Some((cached, diff)) =
            diff_float_column(rr, cache, TOTAL_GRANT_KB_COL, 1.0, i, &mut errs)
        {
            if cached {
                record.put_double(TOTAL_GRANT_KB_COL, diff as f64);
            }
        }

        match obfuscate_sql(rr.row.col(TEXT_COL)) {
            Ok(obfuscated) => record.put_str("query_text", obfuscated),
            Err(error) => {
                tracing::error!(%error, "failed to obfuscate query text");
                errs.push(error);
            }
        }

        match obfuscate_xml_plan(rr.row.col(QUERY_PLAN_COL)) {
            Ok(obfuscated) => record.put_str("normalized_query_plan", obfuscated),
            Err(error) => {
                tracing::error!(%error, "failed to obfuscate query plan");
                errs.push(error);
            }
        }

        record.set_body("text");
        logs.push(record);
    }

    errs.into_error()
}
