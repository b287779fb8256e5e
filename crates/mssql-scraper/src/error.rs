//! Scrape error taxonomy.
//!
//! Mappers never panic and never abort a batch over one bad cell: per-row
//! failures are collected into a [`JoinedErrors`] and handed back next to
//! whatever was successfully built, so the host can report partial
//! success. Hard failures (connection loss, a query kind dispatched to the
//! wrong pipeline) abort the scrape with a [`ScrapeError`].

use std::fmt;

use thiserror::Error;

use crate::adapter::DbError;

/// A numeric cell that failed to parse while mapping a row.
#[derive(Debug, Error)]
#[error("row {row}: invalid value {value:?} for column {column}")]
pub struct CellParseError {
    /// Zero-based row index within the scrape.
    pub row: usize,
    /// Column the cell came from.
    pub column: &'static str,
    /// The offending raw cell.
    pub value: String,
    /// Underlying parse failure.
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl CellParseError {
    pub(crate) fn new(
        row: usize,
        column: &'static str,
        value: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            row,
            column,
            value: value.to_string(),
            source: Box::new(source),
        }
    }
}

/// Per-row failures joined into one error value.
///
/// Mirrors the collect-and-join shape of the scrape contract: the batch is
/// still usable, the joined error describes what was dropped.
#[derive(Debug, Default)]
pub struct JoinedErrors {
    errors: Vec<Box<dyn std::error::Error + Send + Sync>>,
}

impl JoinedErrors {
    /// Collect another failure.
    pub fn push(&mut self, error: impl std::error::Error + Send + Sync + 'static) {
        self.errors.push(Box::new(error));
    }

    /// Number of collected failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The collected failures.
    #[must_use]
    pub fn errors(&self) -> &[Box<dyn std::error::Error + Send + Sync>] {
        &self.errors
    }

    /// Fold into a [`ScrapeError::Partial`], or `None` when empty.
    #[must_use]
    pub fn into_error(self) -> Option<ScrapeError> {
        if self.is_empty() {
            None
        } else {
            Some(ScrapeError::Partial(self))
        }
    }
}

impl fmt::Display for JoinedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for JoinedErrors {}

/// Errors surfaced by scraper operations.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The database adapter failed hard; the cycle yields no data.
    #[error("database client error: {0}")]
    Db(#[from] DbError),

    /// `scrape_*` was called before `start`.
    #[error("scraper has not been started")]
    NotStarted,

    /// A query kind was dispatched to the wrong pipeline. Programmer error.
    #[error("query kind {kind} does not produce {family}")]
    UnsupportedKind {
        /// The offending kind's name.
        kind: &'static str,
        /// `"metrics"` or `"logs"`.
        family: &'static str,
    },

    /// The scrape was canceled while mapping rows.
    #[error("scrape canceled")]
    Canceled,

    /// Per-row failures collected during mapping; the batch is usable.
    #[error("partial scrape: {0}")]
    Partial(JoinedErrors),
}

/// Outcome of one scrape: the batch built so far plus the partial-failure
/// error, if any. A hard failure is an `Err` instead.
#[derive(Debug)]
pub struct Scraped<T> {
    /// The emitted batch. May be empty.
    pub batch: T,
    /// Joined per-row failures, or a cancellation observed mid-mapping.
    pub error: Option<ScrapeError>,
}
