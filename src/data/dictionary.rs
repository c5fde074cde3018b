//! Compound dictionary keyed by canonical compound identifier.

use super::table::{Cell, Table};
use crate::error::{EdaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical identifier column of a prepared dictionary.
pub const NAME_COLUMN: &str = "Name";
/// Human-readable label column of a prepared dictionary.
pub const LABEL_COLUMN: &str = "Label";

/// A compound dictionary whose "Name" column is the authoritative key for
/// matching against matrix columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundDictionary {
    table: Table,
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl CompoundDictionary {
    /// Wrap a table that already carries a "Name" column.
    ///
    /// Rows with a missing name are kept in the table but do not take part
    /// in matching. For duplicated names the first row wins lookups.
    pub fn new(table: Table) -> Result<Self> {
        let name_idx = table.column_index(NAME_COLUMN).ok_or_else(|| {
            EdaError::Schema(format!(
                "dictionary '{}' has no '{}' column",
                table.name(),
                NAME_COLUMN
            ))
        })?;

        let mut names = Vec::new();
        let mut lookup = HashMap::new();
        for (row, cells) in table.rows().iter().enumerate() {
            if let Some(name) = cells[name_idx].as_string() {
                lookup.entry(name.clone()).or_insert(row);
                names.push(name);
            }
        }

        Ok(Self {
            table,
            names,
            lookup,
        })
    }

    /// Canonical names in dictionary row order, missing names skipped.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of dictionary rows.
    pub fn len(&self) -> usize {
        self.table.n_rows()
    }

    /// Check if the dictionary has no rows.
    pub fn is_empty(&self) -> bool {
        self.table.n_rows() == 0
    }

    /// Underlying table.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Label of a compound, if the dictionary has a "Label" column.
    pub fn label(&self, name: &str) -> Option<String> {
        self.cell(name, LABEL_COLUMN).and_then(Cell::as_string)
    }

    /// 1-based dictionary index of a compound.
    pub fn idx(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).map(|row| row + 1)
    }

    /// Any other attribute (e.g. pathway) of a compound.
    pub fn cell(&self, name: &str, column: &str) -> Option<&Cell> {
        let row = *self.lookup.get(name)?;
        let col = self.table.column_index(column)?;
        Some(self.table.get(row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary_table() -> Table {
        Table::new(
            "dict",
            vec![NAME_COLUMN.into(), LABEL_COLUMN.into()],
            vec![
                vec![Cell::Text("compound_002".into()), Cell::Text("Lactate".into())],
                vec![Cell::Text("compound_001".into()), Cell::Text("Glucose".into())],
                vec![Cell::Missing, Cell::Text("Orphan".into())],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_names_in_row_order() {
        let dict = CompoundDictionary::new(dictionary_table()).unwrap();
        assert_eq!(dict.names(), &["compound_002", "compound_001"]);
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn test_lookup() {
        let dict = CompoundDictionary::new(dictionary_table()).unwrap();
        assert_eq!(dict.label("compound_001").as_deref(), Some("Glucose"));
        assert_eq!(dict.idx("compound_001"), Some(2));
        assert_eq!(dict.label("compound_999"), None);
    }

    #[test]
    fn test_missing_name_column() {
        let table = Table::new("dict", vec!["compound".into()], vec![]).unwrap();
        let err = CompoundDictionary::new(table).unwrap_err();
        assert!(matches!(err, EdaError::Schema(_)));
    }
}
