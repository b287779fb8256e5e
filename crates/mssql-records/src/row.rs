//! Row representation for scraped query results.

use indexmap::IndexMap;

/// One result row: an insertion-ordered map from column name to the raw
/// cell value as delivered by the driver.
///
/// Cells are plain strings; numeric columns are parsed on demand by the
/// mappers. Rows have no identity and are not mutated after the adapter
/// returns them. A missing column reads as the empty string, the same as a
/// NULL cell the adapter already blanked out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: IndexMap<String, String>,
}

impl Row {
    /// Create an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a cell, replacing any previous value for the column.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.cells.insert(column.into(), value.into());
    }

    /// Builder-style cell insertion, used heavily by test fixtures.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    /// Get a cell value; absent columns read as the empty string.
    #[must_use]
    pub fn col(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    /// Get a cell value only if the column is present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate cells in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_missing_column_reads_empty() {
        let row = Row::new().with("reads", "10");
        assert_eq!(row.col("reads"), "10");
        assert_eq!(row.col("writes"), "");
        assert_eq!(row.get("writes"), None);
    }

    #[test]
    fn test_row_preserves_insertion_order() {
        let row = Row::new().with("b", "2").with("a", "1").with("c", "3");
        let cols: Vec<&str> = row.iter().map(|(k, _)| k).collect();
        assert_eq!(cols, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_row_set_replaces() {
        let mut row = Row::new().with("x", "1");
        row.set("x", "2");
        assert_eq!(row.col("x"), "2");
        assert_eq!(row.len(), 1);
    }
}
