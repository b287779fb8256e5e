//! Server-properties mapper: database counts by state.

use tokio_util::sync::CancellationToken;

use mssql_records::{DatabaseStatus, MetricsBatch, ResourceAttributes, Row, Timestamp};

use crate::error::{JoinedErrors, ScrapeError};
use crate::mappers::{COMPUTER_NAME_COL, INSTANCE_NAME_COL};

const DB_ONLINE_COL: &str = "db_online";
const DB_RESTORING_COL: &str = "db_restoring";
const DB_RECOVERING_COL: &str = "db_recovering";
const DB_RECOVERY_PENDING_COL: &str = "db_recoveryPending";
const DB_SUSPECT_COL: &str = "db_suspect";
const DB_OFFLINE_COL: &str = "db_offline";

pub(crate) fn record_database_status_metrics(
    mb: &mut MetricsBatch,
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

        let resource =
            ResourceAttributes::new(row.col(COMPUTER_NAME_COL), row.col(INSTANCE_NAME_COL));

        for (column, status) in [
            (DB_ONLINE_COL, DatabaseStatus::Online),
            (DB_RESTORING_COL, DatabaseStatus::Restoring),
            (DB_RECOVERING_COL, DatabaseStatus::Recovering),
            (DB_RECOVERY_PENDING_COL, DatabaseStatus::PendingRecovery),
            (DB_SUSPECT_COL, DatabaseStatus::Suspect),
            (DB_OFFLINE_COL, DatabaseStatus::Offline),
        ] {
            if let Err(error) = mb.record_database_count_data_point(now, row.col(column), status) {
                errs.push(error);
            }
        }

        mb.emit_for_resource(resource);
    }

    errs.into_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssql_records::MetricValue;
    use mssql_records::metrics::{attrs, names};

    fn status_row() -> Row {
        Row::new()
            .with(COMPUTER_NAME_COL, "H")
            .with(INSTANCE_NAME_COL, "I")
            .with(DB_ONLINE_COL, "5")
            .with(DB_RESTORING_COL, "0")
            .with(DB_RECOVERING_COL, "0")
            .with(DB_RECOVERY_PENDING_COL, "0")
            .with(DB_SUSPECT_COL, "0")
            .with(DB_OFFLINE_COL, "1")
    }

    #[test]
    fn test_six_status_points_per_row() {
        let mut mb = MetricsBatch::new();
        let error = record_database_status_metrics(
            &mut mb,
            &[status_row()],
            Timestamp::from_nanos(1),
            &CancellationToken::new(),
        );
        assert!(error.is_none());

        let metrics = mb.emit();
        assert_eq!(metrics.data_point_count(), 6);

        let by_status: Vec<(String, i64)> = metrics
            .points_named(names::DATABASE_COUNT.0)
            .map(|p| {
                let status = p
                    .attributes
                    .iter()
                    .find(|(k, _)| *k == attrs::STATUS)
                    .map(|(_, v)| v.clone())
                    .unwrap();
                (status, p.value.as_int().unwrap())
            })
            .collect();
        assert_eq!(
            by_status,
            vec![
                ("online".to_string(), 5),
                ("restoring".to_string(), 0),
                ("recovering".to_string(), 0),
                ("pending_recovery".to_string(), 0),
                ("suspect".to_string(), 0),
                ("offline".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_bad_count_suppresses_only_that_status() {
        let mut row = status_row();
        row.set(DB_SUSPECT_COL, "?");

        let mut mb = MetricsBatch::new();
        let error = record_database_status_metrics(
            &mut mb,
            &[row],
            Timestamp::from_nanos(1),
            &CancellationToken::new(),
        );
        assert!(matches!(error, Some(ScrapeError::Partial(_))));
        let metrics = mb.emit();
        assert_eq!(metrics.data_point_count(), 5);
        let online = metrics.points_named(names::DATABASE_COUNT.0).next().unwrap();
        assert_eq!(online.value, MetricValue::Int(5));
    }
}
