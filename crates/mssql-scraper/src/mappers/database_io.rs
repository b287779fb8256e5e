//! Database I/O mapper: one resource per database file row.

use tokio_util::sync::CancellationToken;

use mssql_records::{Direction, MetricsBatch, ResourceAttributes, Row, Timestamp};

use crate::error::{CellParseError, JoinedErrors, ScrapeError};
use crate::mappers::{COMPUTER_NAME_COL, INSTANCE_NAME_COL};

const DATABASE_NAME_COL: &str = "database_name";
const PHYSICAL_FILENAME_COL: &str = "physical_filename";
const LOGICAL_FILENAME_COL: &str = "logical_filename";
const FILE_TYPE_COL: &str = "file_type";
const READ_LATENCY_MS_COL: &str = "read_latency_ms";
const WRITE_LATENCY_MS_COL: &str = "write_latency_ms";
const READS_COL: &str = "reads";
const WRITES_COL: &str = "writes";
const READ_BYTES_COL: &str = "read_bytes";
const WRITE_BYTES_COL: &str = "write_bytes";

pub(crate) fn record_database_io_metrics(
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

        let resource = ResourceAttributes::new(row.col(COMPUTER_NAME_COL), row.col(INSTANCE_NAME_COL))
            .with_database_name(row.col(DATABASE_NAME_COL));
        let physical = row.col(PHYSICAL_FILENAME_COL);
        let logical = row.col(LOGICAL_FILENAME_COL);
        let file_type = row.col(FILE_TYPE_COL);

        for (column, direction) in [
            (READ_LATENCY_MS_COL, Direction::Read),
            (WRITE_LATENCY_MS_COL, Direction::Write),
        ] {
            match row.col(column).parse::<f64>() {
                Ok(latency_ms) => mb.record_database_latency_data_point(
                    now,
                    latency_ms / 1e3,
                    physical,
                    logical,
                    file_type,
                    direction,
                ),
                Err(source) => errs.push(CellParseError::new(i, column, row.col(column), source)),
            }
        }

        for (column, direction) in [(READS_COL, Direction::Read), (WRITES_COL, Direction::Write)] {
            if let Err(error) = mb.record_database_operations_data_point(
                now,
                row.col(column),
                physical,
                logical,
                file_type,
                direction,
            ) {
                errs.push(error);
            }
        }

        for (column, direction) in [
            (READ_BYTES_COL, Direction::Read),
            (WRITE_BYTES_COL, Direction::Write),
        ] {
            if let Err(error) = mb.record_database_io_data_point(
                now,
                row.col(column),
                physical,
                logical,
                file_type,
                direction,
            ) {
                errs.push(error);
            }
        }

        mb.emit_for_resource(resource);
    }

    if rows.is_empty() {
        tracing::info!("no rows returned by the database I/O query");
    }

    errs.into_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssql_records::metrics::{attrs, names};
    use mssql_records::MetricValue;

    fn io_row() -> Row {
        Row::new()
            .with(COMPUTER_NAME_COL, "H")
            .with(DATABASE_NAME_COL, "db1")
            .with(INSTANCE_NAME_COL, "I")
            .with(PHYSICAL_FILENAME_COL, "/data/db1.mdf")
            .with(LOGICAL_FILENAME_COL, "db1")
            .with(FILE_TYPE_COL, "ROWS")
            .with(READ_LATENCY_MS_COL, "1500")
            .with(WRITE_LATENCY_MS_COL, "2500")
            .with(READS_COL, "10")
            .with(WRITES_COL, "20")
            .with(READ_BYTES_COL, "4096")
            .with(WRITE_BYTES_COL, "8192")
    }

    fn direction_of(point: &mssql_records::DataPoint) -> &str {
        point
            .attributes
            .iter()
            .find(|(k, _)| *k == attrs::DIRECTION)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn test_one_row_emits_six_points_on_one_resource() {
        let mut mb = MetricsBatch::new();
        let error = record_database_io_metrics(
            &mut mb,
            &[io_row()],
            Timestamp::from_nanos(1),
            &CancellationToken::new(),
        );
        assert!(error.is_none());

        let metrics = mb.emit();
        assert_eq!(metrics.resource_metrics.len(), 1);
        assert_eq!(metrics.data_point_count(), 6);

        let resource = &metrics.resource_metrics[0].resource;
        assert_eq!(resource.computer_name(), "H");
        assert_eq!(resource.instance_name(), "I");
        assert_eq!(resource.database_name(), Some("db1"));

        let latencies: Vec<_> = metrics.points_named(names::DATABASE_LATENCY.0).collect();
        assert_eq!(latencies.len(), 2);
        assert_eq!(direction_of(latencies[0]), "read");
        assert_eq!(latencies[0].value, MetricValue::Double(1.5));
        assert_eq!(direction_of(latencies[1]), "write");
        assert_eq!(latencies[1].value, MetricValue::Double(2.5));

        let operations: Vec<_> = metrics.points_named(names::DATABASE_OPERATIONS.0).collect();
        assert_eq!(operations[0].value, MetricValue::Int(10));
        assert_eq!(operations[1].value, MetricValue::Int(20));

        let io: Vec<_> = metrics.points_named(names::DATABASE_IO.0).collect();
        assert_eq!(io[0].value, MetricValue::Int(4096));
        assert_eq!(io[1].value, MetricValue::Int(8192));
    }

    #[test]
    fn test_bad_cell_suppresses_only_its_point() {
        let mut row = io_row();
        row.set(READ_LATENCY_MS_COL, "garbage");

        let mut mb = MetricsBatch::new();
        let error = record_database_io_metrics(
            &mut mb,
            &[row],
            Timestamp::from_nanos(1),
            &CancellationToken::new(),
        );
        match error {
            Some(ScrapeError::Partial(joined)) => assert_eq!(joined.len(), 1),
            other => panic!("expected partial error, got {other:?}"),
        }

        let metrics = mb.emit();
        assert_eq!(metrics.data_point_count(), 5);
        assert_eq!(metrics.points_named(names::DATABASE_LATENCY.0).count(), 1);
    }

    #[test]
    fn test_empty_rows_is_not_an_error() {
        let mut mb = MetricsBatch::new();
        let error = record_database_io_metrics(
            &mut mb,
            &[],
            Timestamp::from_nanos(1),
            &CancellationToken::new(),
        );
        assert!(error.is_none());
        assert!(mb.emit().is_empty());
    }

    #[test]
    fn test_cancellation_stops_between_rows() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut mb = MetricsBatch::new();
        let error = record_database_io_metrics(
            &mut mb,
            &[io_row(), io_row()],
            Timestamp::from_nanos(1),
            &cancel,
        );
        assert!(matches!(error, Some(ScrapeError::Partial(_))));
        assert!(mb.emit().is_empty());
    }
}
