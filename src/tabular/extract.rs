//! Positional mapping of raw rows onto named columns.

use std::collections::{HashMap, HashSet};

use crate::error::{AppError, RowError};

// ─────────────────────────────────────────────────────────────────────────────
// ColumnSchema
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered, unique column names. Position `i` in the schema reads cell `i`
/// of every row; header names in the file are never consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    fields: Vec<String>,
}

impl ColumnSchema {
    /// Builds a schema, rejecting empty or duplicate field names.
    pub fn new<I, S>(fields: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(fields.len());

        for field in &fields {
            if field.trim().is_empty() {
                return Err(AppError::InvalidSchema("empty column name".to_string()));
            }
            if !seen.insert(field.as_str()) {
                return Err(AppError::InvalidSchema(format!(
                    "duplicate column '{}'",
                    field
                )));
            }
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Zips the schema against a row. Cells past the schema are ignored;
    /// fields past the end of a short row are simply absent.
    pub fn extract(&self, row: &Row) -> ExtractedValues {
        let values = self
            .fields
            .iter()
            .zip(row.cells())
            .map(|(field, cell)| (field.clone(), cell.clone()))
            .collect();
        ExtractedValues { values }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row
// ─────────────────────────────────────────────────────────────────────────────

/// One data row of string cells, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<String>,
}

impl Row {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// A row is blank when every cell is empty after trimming.
    /// A row with no cells at all is blank too.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|cell| cell.trim().is_empty())
    }
}

impl<S: Into<String>> FromIterator<S> for Row {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ExtractedValues
// ─────────────────────────────────────────────────────────────────────────────

/// Field name to raw cell value, for one row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedValues {
    values: HashMap<String, String>,
}

impl ExtractedValues {
    /// Raw value, or `None` when the row was too short.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Trimmed value, treating empty cells as absent.
    pub fn non_empty(&self, field: &str) -> Option<&str> {
        self.get(field).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Trimmed value, or a `MissingValue` row error.
    pub fn require(&self, field: &str) -> Result<&str, RowError> {
        self.non_empty(field).ok_or_else(|| RowError::MissingValue {
            column: field.to_string(),
        })
    }

    /// Owned copy of a non-empty value.
    pub fn owned(&self, field: &str) -> Option<String> {
        self.non_empty(field).map(str::to_string)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtractedValues {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_rejects_duplicates_and_empty_names() {
        assert!(ColumnSchema::new(["username", "name"]).is_ok());
        assert!(matches!(
            ColumnSchema::new(["username", "username"]),
            Err(AppError::InvalidSchema(_))
        ));
        assert!(matches!(
            ColumnSchema::new(["username", " "]),
            Err(AppError::InvalidSchema(_))
        ));
    }

    #[test]
    fn extract_maps_positions_and_ignores_extra_cells() {
        let schema = ColumnSchema::new(["username", "en_NZ_name"]).unwrap();
        let row: Row = ["owner", "Lunch", "ignored"].into_iter().collect();

        let values = schema.extract(&row);

        assert_eq!(values.get("username"), Some("owner"));
        assert_eq!(values.get("en_NZ_name"), Some("Lunch"));
        assert_eq!(values.get("ignored"), None);
    }

    #[test]
    fn short_rows_yield_absent_fields() {
        let schema = ColumnSchema::new(["username", "en_NZ_name", "tags"]).unwrap();
        let row: Row = ["owner"].into_iter().collect();

        let values = schema.extract(&row);

        assert_eq!(values.get("username"), Some("owner"));
        assert_eq!(values.get("en_NZ_name"), None);
        assert_eq!(values.get("tags"), None);
        assert_eq!(values.get("not_in_schema"), None);
    }

    #[test]
    fn non_empty_and_require_trim_values() {
        let values: ExtractedValues = [("a", "  x  "), ("b", "   ")].into_iter().collect();

        assert_eq!(values.non_empty("a"), Some("x"));
        assert_eq!(values.non_empty("b"), None);
        assert!(matches!(
            values.require("b"),
            Err(RowError::MissingValue { column }) if column == "b"
        ));
        assert_eq!(values.require("a").unwrap(), "x");
    }

    #[test]
    fn blank_rows_are_detected() {
        assert!(Row::new(vec![]).is_blank());
        assert!(["", "  ", "\t"].into_iter().collect::<Row>().is_blank());
        assert!(!["", "x"].into_iter().collect::<Row>().is_blank());
    }
}
