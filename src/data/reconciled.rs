//! Samples-as-rows feature table produced by schema reconciliation.

use super::table::Cell;
use crate::error::{EdaError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Positional index column.
pub const IDX_COLUMN: &str = "Idx";
/// Class label column.
pub const CLASS_COLUMN: &str = "Class";
/// Sample identifier column.
pub const SAMPLE_ID_COLUMN: &str = "SampleID";
/// Columns that are never features.
pub const META_COLUMNS: [&str; 3] = [IDX_COLUMN, CLASS_COLUMN, SAMPLE_ID_COLUMN];

/// One row per sample, one column per compound.
///
/// Rows carry a 1-based `Idx`, an optional class label and a sample
/// identifier. Data columns are stored row-major as cells so that the
/// numeric coercion applied during reconciliation stays visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledTable {
    idx: Vec<usize>,
    classes: Vec<Option<String>>,
    sample_ids: Vec<String>,
    data_columns: Vec<String>,
    values: Vec<Vec<Cell>>,
}

impl ReconciledTable {
    /// Create a table, checking that all per-row vectors agree.
    pub fn new(
        idx: Vec<usize>,
        classes: Vec<Option<String>>,
        sample_ids: Vec<String>,
        data_columns: Vec<String>,
        values: Vec<Vec<Cell>>,
    ) -> Result<Self> {
        let n_rows = sample_ids.len();
        for len in [idx.len(), classes.len(), values.len()] {
            if len != n_rows {
                return Err(EdaError::DimensionMismatch {
                    expected: n_rows,
                    actual: len,
                });
            }
        }
        for row in &values {
            if row.len() != data_columns.len() {
                return Err(EdaError::DimensionMismatch {
                    expected: data_columns.len(),
                    actual: row.len(),
                });
            }
        }
        Ok(Self {
            idx,
            classes,
            sample_ids,
            data_columns,
            values,
        })
    }

    /// Number of sample rows.
    pub fn n_rows(&self) -> usize {
        self.sample_ids.len()
    }

    /// Number of data (non-metadata) columns.
    pub fn n_data_columns(&self) -> usize {
        self.data_columns.len()
    }

    /// Data column names, excluding Idx / Class / SampleID.
    pub fn data_columns(&self) -> &[String] {
        &self.data_columns
    }

    /// Full column list: Idx, Class, SampleID, then data columns.
    pub fn columns(&self) -> Vec<String> {
        META_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.data_columns.iter().cloned())
            .collect()
    }

    /// Check if a data column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// 1-based row indices.
    pub fn idx(&self) -> &[usize] {
        &self.idx
    }

    /// Class label per row.
    pub fn classes(&self) -> &[Option<String>] {
        &self.classes
    }

    /// Sample identifier per row.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Cell at (row, data column name).
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.values.get(row).map(|r| &r[col])
    }

    /// Numeric values of a data column, `None` where missing.
    pub fn numeric_column(&self, column: &str) -> Result<Vec<Option<f64>>> {
        let col = self.require_column(column)?;
        Ok(self.values.iter().map(|r| r[col].to_number()).collect())
    }

    /// Dense `rows × columns` matrix of the selected columns, in the given
    /// order. Missing or non-numeric cells become NaN.
    pub fn feature_matrix(&self, columns: &[String]) -> Result<DMatrix<f64>> {
        let indices = columns
            .iter()
            .map(|c| self.require_column(c))
            .collect::<Result<Vec<_>>>()?;

        Ok(DMatrix::from_fn(self.n_rows(), indices.len(), |i, j| {
            self.values[i][indices[j]].to_number().unwrap_or(f64::NAN)
        }))
    }

    /// Return a copy with each class label passed through `f`.
    pub fn map_classes<F>(&self, f: F) -> Self
    where
        F: Fn(&str) -> String,
    {
        let mut out = self.clone();
        out.classes = self
            .classes
            .iter()
            .map(|c| c.as_deref().map(&f))
            .collect();
        out
    }

    /// Return a copy containing only rows whose position satisfies `keep`.
    pub fn filter_rows<F>(&self, keep: F) -> Self
    where
        F: Fn(usize) -> bool,
    {
        let rows: Vec<usize> = (0..self.n_rows()).filter(|&i| keep(i)).collect();
        Self {
            idx: rows.iter().map(|&i| self.idx[i]).collect(),
            classes: rows.iter().map(|&i| self.classes[i].clone()).collect(),
            sample_ids: rows.iter().map(|&i| self.sample_ids[i].clone()).collect(),
            data_columns: self.data_columns.clone(),
            values: rows.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }

    /// Return a copy keeping only rows whose class is one of `classes`.
    pub fn retain_classes(&self, classes: &[&str]) -> Self {
        self.filter_rows(|i| {
            self.classes[i]
                .as_deref()
                .map_or(false, |c| classes.contains(&c))
        })
    }

    /// Write the table (metadata columns first) as TSV.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "{}", self.columns().join("\t"))?;
        for row in 0..self.n_rows() {
            write!(
                writer,
                "{}\t{}\t{}",
                self.idx[row],
                self.classes[row].as_deref().unwrap_or("NA"),
                self.sample_ids[row]
            )?;
            for cell in &self.values[row] {
                write!(writer, "\t{}", cell)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.data_columns.iter().position(|c| c == column)
    }

    fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column).ok_or_else(|| EdaError::MissingColumn {
            column: column.to_string(),
            table: "reconciled feature table".to_string(),
        })
    }
}
