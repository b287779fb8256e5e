//! Live session sample mapper.
//!
//! One log record per active session row, deduplicated per scrape
//! interval by the `query_hash-plan_hash` pair. Numeric parse failures
//! are logged and leave the attribute at its zero value; a sample is
//! never dropped over one bad cell.

use tokio_util::sync::CancellationToken;

use mssql_obfuscate::obfuscate_sql;
use mssql_records::{LogRecord, LogsBatch, Row, Timestamp};

use crate::cache::CounterCache;
use crate::error::{JoinedErrors, ScrapeError};
use crate::waits::classify;

const USER_NAME_COL: &str = "user_name";
const DB_NAME_COL: &str = "db_name";
const CLIENT_ADDRESS_COL: &str = "client_address";
const CLIENT_PORT_COL: &str = "client_port";
const QUERY_START_COL: &str = "query_start";
const SESSION_ID_COL: &str = "session_id";
const SESSION_STATUS_COL: &str = "session_status";
const HOST_NAME_COL: &str = "host_name";
const COMMAND_COL: &str = "command";
const STATEMENT_TEXT_COL: &str = "statement_text";
const BLOCKING_SESSION_ID_COL: &str = "blocking_session_id";
const WAIT_TYPE_COL: &str = "wait_type";
const WAIT_TIME_COL: &str = "wait_time";
const WAIT_RESOURCE_COL: &str = "wait_resource";
const OPEN_TRANSACTION_COUNT_COL: &str = "open_transaction_count";
const TRANSACTION_ID_COL: &str = "transaction_id";
const PERCENT_COMPLETE_COL: &str = "percent_complete";
const ESTIMATED_COMPLETION_TIME_COL: &str = "estimated_completion_time";
const CPU_TIME_COL: &str = "cpu_time";
const TOTAL_ELAPSED_TIME_COL: &str = "total_elapsed_time";
const READS_COL: &str = "reads";
const WRITES_COL: &str = "writes";
const LOGICAL_READS_COL: &str = "logical_reads";
const TRANSACTION_ISOLATION_LEVEL_COL: &str = "transaction_isolation_level";
const LOCK_TIMEOUT_COL: &str = "lock_timeout";
const DEADLOCK_PRIORITY_COL: &str = "deadlock_priority";
const ROW_COUNT_COL: &str = "row_count";
const QUERY_HASH_COL: &str = "query_hash";
const QUERY_PLAN_HASH_COL: &str = "query_plan_hash";
const CONTEXT_INFO_COL: &str = "context_info";
const LOGIN_NAME_COL: &str = "login_name";
const ORIGINAL_LOGIN_NAME_COL: &str = "original_login_name";
const OBJECT_NAME_COL: &str = "object_name";

/// Parse an integer cell; empty reads as zero (the query `ISNULL`s the
/// nullable columns to empty strings), anything unparseable is logged and
/// reads as zero.
fn int_cell(row: &Row, column: &str) -> i64 {
    let raw = row.col(column);
    if raw.is_empty() {
        return 0;
    }
    match raw.parse::<i64>() {
        Ok(value) => value,
        Err(error) => {
            tracing::error!(column, value = raw, %error, "failed to parse sample cell");
            0
        }
    }
}

/// Parse a float cell with the same logging contract as [`int_cell`].
fn float_cell(row: &Row, column: &str) -> f64 {
    let raw = row.col(column);
    if raw.is_empty() {
        return 0.0;
    }
    match raw.parse::<f64>() {
        Ok(value) => value,
        Err(error) => {
            tracing::error!(column, value = raw, %error, "failed to parse sample cell");
            0.0
        }
    }
}

pub(crate) fn record_query_samples(
    logs: &mut LogsBatch,
    cache: &mut Option<CounterCache>,
    rows: &[Row],
    now: Timestamp,
    cancel: &CancellationToken,
) -> Option<ScrapeError> {
    let mut errs = JoinedErrors::default();

    for row in rows {
        if cancel.is_cancelled() {
            errs.push(ScrapeError::Canceled);
            break;
        }

        let query_hash = hex::encode(row.col(QUERY_HASH_COL).as_bytes());
        let query_plan_hash = hex::encode(row.col(QUERY_PLAN_HASH_COL).as_bytes());
        let context_info = hex::encode(row.col(CONTEXT_INFO_COL).as_bytes());

        let emit = match cache.as_mut() {
            Some(cache) => cache.observe_sample(&query_hash, &query_plan_hash),
            None => {
                tracing::error!("counter cache is not initialized, emitting sample without dedup");
                true
            }
        };
        if !emit {
            continue;
        }

        let statement_text = match obfuscate_sql(row.col(STATEMENT_TEXT_COL)) {
            Ok(obfuscated) => obfuscated,
            Err(error) => {
                tracing::error!(%error, "failed to obfuscate sample statement");
                String::new()
            }
        };

        let mut record = LogRecord::new(now);
        record.put_str(USER_NAME_COL, row.col(USER_NAME_COL));
        record.put_str(DB_NAME_COL, row.col(DB_NAME_COL));
        record.put_str(CLIENT_ADDRESS_COL, row.col(CLIENT_ADDRESS_COL));
        record.put_int(CLIENT_PORT_COL, int_cell(row, CLIENT_PORT_COL));
        record.put_str(QUERY_START_COL, row.col(QUERY_START_COL));
        record.put_int(SESSION_ID_COL, int_cell(row, SESSION_ID_COL));
        record.put_str(SESSION_STATUS_COL, row.col(SESSION_STATUS_COL));
        record.put_str(HOST_NAME_COL, row.col(HOST_NAME_COL));
        record.put_str(COMMAND_COL, row.col(COMMAND_COL));
        record.put_str(STATEMENT_TEXT_COL, statement_text);
        record.put_int(
            BLOCKING_SESSION_ID_COL,
            int_cell(row, BLOCKING_SESSION_ID_COL),
        );
        record.put_str(WAIT_TYPE_COL, row.col(WAIT_TYPE_COL));
        record.put_int(WAIT_TIME_COL, int_cell(row, WAIT_TIME_COL));
        record.put_str(WAIT_RESOURCE_COL, row.col(WAIT_RESOURCE_COL));
        record.put_int(
            OPEN_TRANSACTION_COUNT_COL,
            int_cell(row, OPEN_TRANSACTION_COUNT_COL),
        );
        record.put_int(TRANSACTION_ID_COL, int_cell(row, TRANSACTION_ID_COL));
        record.put_double(PERCENT_COMPLETE_COL, float_cell(row, PERCENT_COMPLETE_COL));
        record.put_double(
            ESTIMATED_COMPLETION_TIME_COL,
            float_cell(row, ESTIMATED_COMPLETION_TIME_COL),
        );
        record.put_int(CPU_TIME_COL, int_cell(row, CPU_TIME_COL));
        record.put_int(TOTAL_ELAPSED_TIME_COL, int_cell(row, TOTAL_ELAPSED_TIME_COL));
        record.put_int(READS_COL, int_cell(row, READS_COL));
        record.put_int(WRITES_COL, int_cell(row, WRITES_COL));
        record.put_int(LOGICAL_READS_COL, int_cell(row, LOGICAL_READS_COL));
        record.put_int(
            TRANSACTION_ISOLATION_LEVEL_COL,
            int_cell(row, TRANSACTION_ISOLATION_LEVEL_COL),
        );
        record.put_int(LOCK_TIMEOUT_COL, int_cell(row, LOCK_TIMEOUT_COL));
        record.put_int(DEADLOCK_PRIORITY_COL, int_cell(row, DEADLOCK_PRIORITY_COL));
        record.put_int(ROW_COUNT_COL, int_cell(row, ROW_COUNT_COL));
        record.put_str(QUERY_HASH_COL, query_hash);
        record.put_str(QUERY_PLAN_HASH_COL, query_plan_hash);
        record.put_str(CONTEXT_INFO_COL, context_info);
        record.put_str(LOGIN_NAME_COL, row.col(LOGIN_NAME_COL));
        record.put_str(ORIGINAL_LOGIN_NAME_COL, row.col(ORIGINAL_LOGIN_NAME_COL));
        record.put_str(OBJECT_NAME_COL, row.col(OBJECT_NAME_COL));

        let (wait_code, wait_category) = classify(row.col(WAIT_TYPE_COL));
        record.put_int("wait_code", i64::from(wait_code));
        record.put_str("wait_category", wait_category);

        record.set_body("sample");
        logs.push(record);
    }

    errs.into_error()
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use mssql_records::AnyValue;

    fn sample_row(session_id: &str, hash: &str) -> Row {
        Row::new()
            .with(USER_NAME_COL, "app_user")
            .with(DB_NAME_COL, "orders")
            .with(CLIENT_ADDRESS_COL, "10.0.0.8")
            .with(CLIENT_PORT_COL, "50122")
            .with(QUERY_START_COL, "2025-04-01T12:00:00.000")
            .with(SESSION_ID_COL, session_id)
            .with(SESSION_STATUS_COL, "running")
            .with(HOST_NAME_COL, "app01")
            .with(COMMAND_COL, "SELECT")
            .with(STATEMENT_TEXT_COL, "SELECT * FROM orders WHERE id = 99")
            .with(BLOCKING_SESSION_ID_COL, "0")
            .with(WAIT_TYPE_COL, "PAGEIOLATCH_SH")
            .with(WAIT_TIME_COL, "12")
            .with(WAIT_RESOURCE_COL, "5:1:845")
            .with(OPEN_TRANSACTION_COUNT_COL, "1")
            .with(TRANSACTION_ID_COL, "771")
            .with(PERCENT_COMPLETE_COL, "12.5")
            .with(ESTIMATED_COMPLETION_TIME_COL, "0")
            .with(CPU_TIME_COL, "30")
            .with(TOTAL_ELAPSED_TIME_COL, "41")
            .with(READS_COL, "7")
            .with(WRITES_COL, "2")
            .with(LOGICAL_READS_COL, "64")
            .with(TRANSACTION_ISOLATION_LEVEL_COL, "2")
            .with(LOCK_TIMEOUT_COL, "")
            .with(DEADLOCK_PRIORITY_COL, "")
            .with(ROW_COUNT_COL, "1")
            .with(QUERY_HASH_COL, hash)
            .with(QUERY_PLAN_HASH_COL, "plan")
            .with(CONTEXT_INFO_COL, "ctx")
            .with(LOGIN_NAME_COL, "app_user")
            .with(ORIGINAL_LOGIN_NAME_COL, "app_user")
            .with(OBJECT_NAME_COL, "usp_orders")
    }

    fn new_cache() -> Option<CounterCache> {
        Some(CounterCache::new(NonZeroUsize::new(64).unwrap()))
    }

    fn map(rows: &[Row], cache: &mut Option<CounterCache>) -> LogsBatch {
        let mut logs = LogsBatch::new();
        let error = record_query_samples(
            &mut logs,
            cache,
            rows,
            Timestamp::from_nanos(1),
            &CancellationToken::new(),
        );
        assert!(error.is_none());
        logs
    }

    #[test]
    fn test_sample_record_attributes() {
        let mut cache = new_cache();
        let logs = map(&[sample_row("51", "a")], &mut cache);
        assert_eq!(logs.len(), 1);

        let record = &logs.records()[0];
        assert_eq!(record.body(), "sample");
        assert_eq!(record.timestamp(), Timestamp::from_nanos(1));
        assert_eq!(
            record.attribute(SESSION_ID_COL).and_then(AnyValue::as_int),
            Some(51)
        );
        assert_eq!(
            record.attribute(CLIENT_PORT_COL).and_then(AnyValue::as_int),
            Some(50122)
        );
        assert_eq!(
            record
                .attribute(PERCENT_COMPLETE_COL)
                .and_then(AnyValue::as_double),
            Some(12.5)
        );
        assert_eq!(
            record
                .attribute(STATEMENT_TEXT_COL)
                .and_then(AnyValue::as_str),
            Some("SELECT * FROM orders WHERE id = ?")
        );
        assert_eq!(
            record.attribute(QUERY_HASH_COL).and_then(AnyValue::as_str),
            Some(hex::encode("a").as_str())
        );
        assert_eq!(
            record.attribute(CONTEXT_INFO_COL).and_then(AnyValue::as_str),
            Some(hex::encode("ctx").as_str())
        );
    }

    #[test]
    fn test_wait_classification_attached() {
        let mut cache = new_cache();
        let logs = map(&[sample_row("51", "a")], &mut cache);
        let record = &logs.records()[0];
        assert_eq!(record.attribute("wait_code").and_then(AnyValue::as_int), Some(6));
        assert_eq!(
            record.attribute("wait_category").and_then(AnyValue::as_str),
            Some("Buffer IO")
        );
    }

    #[test]
    fn test_empty_nullable_cells_read_as_zero() {
        let mut cache = new_cache();
        let logs = map(&[sample_row("51", "a")], &mut cache);
        let record = &logs.records()[0];
        assert_eq!(
            record.attribute(LOCK_TIMEOUT_COL).and_then(AnyValue::as_int),
            Some(0)
        );
        assert_eq!(
            record
                .attribute(DEADLOCK_PRIORITY_COL)
                .and_then(AnyValue::as_int),
            Some(0)
        );
    }

    #[test]
    fn test_samples_deduplicated_by_hash_pair() {
        let mut cache = new_cache();
        let logs = map(
            &[
                sample_row("51", "a"),
                sample_row("52", "a"),
                sample_row("53", "b"),
            ],
            &mut cache,
        );
        assert_eq!(logs.len(), 2);

        // A later scrape with the same keys emits nothing new.
        let logs = map(&[sample_row("54", "a"), sample_row("55", "b")], &mut cache);
        assert!(logs.is_empty());
    }

    #[test]
    fn test_unparseable_numeric_cell_reads_zero_and_keeps_sample() {
        let mut row = sample_row("51", "a");
        row.set(CPU_TIME_COL, "many");
        let mut cache = new_cache();
        let logs = map(&[row], &mut cache);
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs.records()[0].attribute(CPU_TIME_COL).and_then(AnyValue::as_int),
            Some(0)
        );
    }
}
