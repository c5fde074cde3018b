//! Loosely-typed tables read from spreadsheet exports.

use crate::error::{EdaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const MISSING_TOKENS: &[&str] = &["", "NA", "na", "N/A", "NaN", "nan", "null", "NULL"];

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    /// Empty or explicitly missing value.
    Missing,
    /// Finite numeric value.
    Number(f64),
    /// Source text, kept verbatim so identifiers such as "001" survive.
    Text(String),
}

impl Cell {
    /// Parse a raw field. Missing tokens become [`Cell::Missing`]; every
    /// other field keeps its spelling and is only read as a number through
    /// [`Cell::to_number`] or [`Cell::coerce_numeric`].
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if MISSING_TOKENS.contains(&trimmed) {
            Cell::Missing
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Numeric coercion: numbers pass, numeric-looking text is parsed,
    /// everything else (including non-finite values) becomes `None`.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Cell::Missing => None,
        }
    }

    /// Coerce to a numeric cell, turning non-coercible values into `Missing`.
    pub fn coerce_numeric(&self) -> Cell {
        self.to_number().map(Cell::Number).unwrap_or(Cell::Missing)
    }

    /// Rendered string form, `None` when missing.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => write!(f, "NA"),
            Cell::Number(v) => write!(f, "{}", v),
            Cell::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A rectangular table of cells with named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create a table, checking that every row has one cell per column.
    pub fn new(name: &str, columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        for row in &rows {
            if row.len() != columns.len() {
                return Err(EdaError::DimensionMismatch {
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }
        Ok(Self {
            name: name.to_string(),
            columns,
            rows,
        })
    }

    /// Load a delimited file. `.csv` files are comma-separated, anything
    /// else is read as tab-separated.
    ///
    /// The first record is the header. Short records are padded with
    /// missing cells, long records are truncated.
    pub fn from_delimited<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
            _ => b'\t',
        };
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("table")
            .to_string();
        let file = File::open(path)?;
        Self::from_reader(&name, file, delimiter)
    }

    /// Load a delimited table from any reader.
    pub fn from_reader<R: Read>(name: &str, reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.is_empty() {
            return Err(EdaError::EmptyData(format!("{} has no header", name)));
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            let mut row: Vec<Cell> = record.iter().take(columns.len()).map(Cell::parse).collect();
            row.resize(columns.len(), Cell::Missing);
            rows.push(row);
        }

        Self::new(name, columns, rows)
    }

    /// Table name (sheet name for loaded tables).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows.
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Position of a column.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Get the cell at (row, col).
    pub fn get(&self, row: usize, col: usize) -> &Cell {
        &self.rows[row][col]
    }

    /// All cells of a column, in row order.
    pub fn column(&self, column: &str) -> Result<Vec<&Cell>> {
        let idx = self.require_column(column)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Index of a column, or a `MissingColumn` error naming this table.
    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| EdaError::MissingColumn {
                column: column.to_string(),
                table: self.name.clone(),
            })
    }

    /// Return a copy with every cell of `column` passed through `f`.
    pub fn map_column<F>(&self, column: &str, f: F) -> Result<Self>
    where
        F: Fn(&Cell) -> Cell,
    {
        let idx = self.require_column(column)?;
        let mut out = self.clone();
        for row in out.rows.iter_mut() {
            row[idx] = f(&row[idx]);
        }
        Ok(out)
    }

    /// Rename a column in place. Returns false when `from` is absent.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Append a column. The number of values must match the row count.
    pub fn push_column(&mut self, name: &str, values: Vec<Cell>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(EdaError::DimensionMismatch {
                expected: self.rows.len(),
                actual: values.len(),
            });
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }
}
