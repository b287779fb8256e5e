//! Logs batch builder.
//!
//! Log records carry a flat attribute map and a string body. The scraper
//! uses them for query-text-and-plan reports and live session samples.

use indexmap::IndexMap;

use crate::Timestamp;

/// A log attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyValue {
    /// String value.
    Str(String),
    /// Integer value.
    Int(i64),
    /// Double value.
    Double(f64),
}

impl AnyValue {
    /// String value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, if this is an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Double value, if this is a double.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }
}

/// One log record: timestamp, body, ordered attribute map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    timestamp: Timestamp,
    body: String,
    attributes: IndexMap<String, AnyValue>,
}

impl LogRecord {
    /// Create an empty record stamped at `timestamp`.
    #[must_use]
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    /// Record timestamp.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Set the record body.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    /// Record body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Put a string attribute.
    pub fn put_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes
            .insert(key.into(), AnyValue::Str(value.into()));
    }

    /// Put an integer attribute.
    pub fn put_int(&mut self, key: impl Into<String>, value: i64) {
        self.attributes.insert(key.into(), AnyValue::Int(value));
    }

    /// Put a double attribute.
    pub fn put_double(&mut self, key: impl Into<String>, value: f64) {
        self.attributes.insert(key.into(), AnyValue::Double(value));
    }

    /// Get an attribute by key.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AnyValue> {
        self.attributes.get(key)
    }

    /// Iterate attributes in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AnyValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes.
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }
}

/// Accumulating logs builder; [`emit`](Self::emit) finishes the batch and
/// resets the builder for the next scrape.
#[derive(Debug, Clone, Default)]
pub struct LogsBatch {
    records: Vec<LogRecord>,
}

impl LogsBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished record.
    pub fn push(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    /// Number of records appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records have been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records appended so far, in order.
    #[must_use]
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Finish the batch, returning the records and resetting the builder.
    pub fn emit(&mut self) -> Vec<LogRecord> {
        std::mem::take(&mut self.records)
    }
}
