//! Performance-counter mapper: pivot on the counter name column.

use tokio_util::sync::CancellationToken;

use mssql_records::{MetricsBatch, ResourceAttributes, Row, Timestamp};

use crate::error::{CellParseError, JoinedErrors, ScrapeError};
use crate::mappers::{COMPUTER_NAME_COL, INSTANCE_NAME_COL};

const COUNTER_COL: &str = "counter";
const VALUE_COL: &str = "value";

const BATCH_REQUEST_RATE: &str = "Batch Requests/sec";
const BUFFER_CACHE_HIT_RATIO: &str = "Buffer cache hit ratio";
const DISK_READ_IO_THROTTLED: &str = "Disk Read IO Throttled/sec";
const DISK_WRITE_IO_THROTTLED: &str = "Disk Write IO Throttled/sec";
const LOCK_WAITS: &str = "Lock Waits/sec";
const PROCESSES_BLOCKED: &str = "Processes blocked";
const SQL_COMPILATION_RATE: &str = "SQL Compilations/sec";
const SQL_RECOMPILATION_RATE: &str = "SQL Re-Compilations/sec";
const USER_CONNECTION_COUNT: &str = "User Connections";

pub(crate) fn record_perf_counter_metrics(
    mb: &mut MetricsBatch,
    rows: &[Row],
    now: Timestamp,
    cancel: &CancellationToken,
) -> Option<ScrapeError> {
    let mut errs = JoinedErrors::default();

    for (i, row) in rows.iter().enumerate() {
        if cancel.is_cancelled() {
            errs.push(ScrapeError::Canceled);
            break;
        }

        let resource =
            ResourceAttributes::new(row.col(COMPUTER_NAME_COL), row.col(INSTANCE_NAME_COL));
        let raw = row.col(VALUE_COL);

        match row.col(COUNTER_COL) {
            BATCH_REQUEST_RATE => match raw.parse::<f64>() {
                Ok(value) => mb.record_batch_request_rate_data_point(now, value),
                Err(source) => errs.push(CellParseError::new(i, VALUE_COL, raw, source)),
            },
            BUFFER_CACHE_HIT_RATIO => match raw.parse::<f64>() {
                Ok(value) => mb.record_page_buffer_cache_hit_ratio_data_point(now, value),
                Err(source) => errs.push(CellParseError::new(i, VALUE_COL, raw, source)),
            },
            DISK_READ_IO_THROTTLED => {
                if let Err(error) =
                    mb.record_resource_pool_disk_throttled_read_rate_data_point(now, raw)
                {
                    errs.push(error);
                }
            }
            DISK_WRITE_IO_THROTTLED => {
                if let Err(error) =
                    mb.record_resource_pool_disk_throttled_write_rate_data_point(now, raw)
                {
                    errs.push(error);
                }
            }
            LOCK_WAITS => match raw.parse::<f64>() {
                Ok(value) => mb.record_lock_wait_rate_data_point(now, value),
                Err(source) => errs.push(CellParseError::new(i, VALUE_COL, raw, source)),
            },
            PROCESSES_BLOCKED => {
                if let Err(error) = mb.record_processes_blocked_data_point(now, raw) {
                    errs.push(error);
                }
            }
            SQL_COMPILATION_RATE => match raw.parse::<f64>() {
                Ok(value) => mb.record_batch_sql_compilation_rate_data_point(now, value),
                Err(source) => errs.push(CellParseError::new(i, VALUE_COL, raw, source)),
            },
            SQL_RECOMPILATION_RATE => match raw.parse::<f64>() {
                Ok(value) => mb.record_batch_sql_recompilation_rate_data_point(now, value),
                Err(source) => errs.push(CellParseError::new(i, VALUE_COL, raw, source)),
            },
            USER_CONNECTION_COUNT => match raw.parse::<i64>() {
                Ok(value) => mb.record_user_connection_count_data_point(now, value),
                Err(source) => errs.push(CellParseError::new(i, VALUE_COL, raw, source)),
            },
            // Counters the query fetches but this pipeline does not map yet.
            _ => {}
        }

        mb.emit_for_resource(resource);
    }

    errs.into_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssql_records::MetricValue;
    use mssql_records::metrics::names;

    fn counter_row(counter: &str, value: &str) -> Row {
        Row::new()
            .with(COMPUTER_NAME_COL, "H")
            .with(INSTANCE_NAME_COL, "I")
            .with(COUNTER_COL, counter)
            .with(VALUE_COL, value)
    }

    fn map(rows: &[Row]) -> (mssql_records::Metrics, Option<ScrapeError>) {
        let mut mb = MetricsBatch::new();
        let error = record_perf_counter_metrics(
            &mut mb,
            rows,
            Timestamp::from_nanos(1),
            &CancellationToken::new(),
        );
        (mb.emit(), error)
    }

    #[test]
    fn test_user_connections_mapped_as_int() {
        let (metrics, error) = map(&[counter_row(USER_CONNECTION_COUNT, "42")]);
        assert!(error.is_none());
        let point = metrics
            .points_named(names::USER_CONNECTION_COUNT.0)
            .next()
            .unwrap();
        assert_eq!(point.value, MetricValue::Int(42));
    }

    #[test]
    fn test_unknown_counter_ignored_silently() {
        let (metrics, error) = map(&[counter_row("Unknown Counter", "17")]);
        assert!(error.is_none());
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_rate_counters_mapped_as_double() {
        let (metrics, error) = map(&[
            counter_row(BATCH_REQUEST_RATE, "101.5"),
            counter_row(BUFFER_CACHE_HIT_RATIO, "99.2"),
            counter_row(LOCK_WAITS, "3.5"),
            counter_row(SQL_COMPILATION_RATE, "11"),
            counter_row(SQL_RECOMPILATION_RATE, "2"),
        ]);
        assert!(error.is_none());
        assert_eq!(metrics.data_point_count(), 5);
        let ratio = metrics
            .points_named(names::PAGE_BUFFER_CACHE_HIT_RATIO.0)
            .next()
            .unwrap();
        assert_eq!(ratio.value, MetricValue::Double(99.2));
    }

    #[test]
    fn test_throttled_and_blocked_counters() {
        let (metrics, error) = map(&[
            counter_row(DISK_READ_IO_THROTTLED, "4"),
            counter_row(DISK_WRITE_IO_THROTTLED, "6"),
            counter_row(PROCESSES_BLOCKED, "1"),
        ]);
        assert!(error.is_none());
        assert_eq!(metrics.data_point_count(), 3);
    }

    #[test]
    fn test_bad_value_collected_and_continues() {
        let (metrics, error) = map(&[
            counter_row(USER_CONNECTION_COUNT, "NaNope"),
            counter_row(BATCH_REQUEST_RATE, "5.0"),
        ]);
        assert!(matches!(error, Some(ScrapeError::Partial(_))));
        assert_eq!(metrics.data_point_count(), 1);
    }

    #[test]
    fn test_resource_carries_host_and_instance() {
        let (metrics, _) = map(&[counter_row(BATCH_REQUEST_RATE, "5.0")]);
        let resource = &metrics.resource_metrics[0].resource;
        assert_eq!(resource.computer_name(), "H");
        assert_eq!(resource.instance_name(), "I");
        assert_eq!(resource.database_name(), None);
    }
}
