//! Schema reconciliation: compound matrix + sample metadata → feature table.
//!
//! The raw matrix arrives with compounds as rows and samples as columns.
//! Reconciliation transposes it, recovers compound headers when the export
//! lost them, attaches `Idx`, `Class` and `SampleID`, drops rows without a
//! sample identifier and coerces compound columns to numeric.

use crate::config::Config;
use crate::data::{
    Cell, CompoundDictionary, ReconciledTable, Table, IDX_COLUMN, LABEL_COLUMN, NAME_COLUMN,
};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{EdaError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Class assigned when the metadata carries no usable class column.
pub const UNKNOWN_CLASS: &str = "Unknown";

/// Minimum share of first-row values that must look like compound
/// identifiers before that row is promoted to the header.
pub const HEADER_MATCH_FRACTION: f64 = 0.8;

/// How reconciled rows are paired with metadata rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// The first N rows take class and identifier from the N metadata rows,
    /// in order.
    #[default]
    Position,
    /// Rows are matched to metadata by sample identifier value.
    SampleId,
}

/// Column names and policies used during reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOptions {
    pub sample_id_column: String,
    pub class_column: String,
    pub compound_id_column: String,
    pub label_column: String,
    pub feature_prefix: String,
    pub join: JoinStrategy,
}

impl ReconcileOptions {
    /// Take column names and the join strategy from a configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            sample_id_column: config.columns.sample_id.clone(),
            class_column: config.columns.class.clone(),
            compound_id_column: config.columns.compound_id.clone(),
            label_column: config.columns.label.clone(),
            feature_prefix: config.columns.feature_prefix.clone(),
            join: config.preprocessing.join,
        }
    }

    /// Pattern of a compound identifier: `<prefix><digits>` or the literal
    /// identifier column name, case-insensitive.
    pub fn compound_pattern(&self) -> Result<Regex> {
        let pattern = format!(
            "(?i)^(?:{}\\d+|{})$",
            regex::escape(&self.feature_prefix),
            regex::escape(&self.compound_id_column)
        );
        Regex::new(&pattern).map_err(|e| EdaError::InvalidParameter(e.to_string()))
    }

    /// Check if a column name follows the compound naming convention.
    pub fn is_feature_column(&self, name: &str) -> bool {
        name.starts_with(&self.feature_prefix)
    }
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Samples-as-rows view of the raw matrix before any join.
#[derive(Debug, Clone, PartialEq)]
pub struct Transposed {
    /// Column headers (compound identifiers, or positions when lost).
    pub headers: Vec<String>,
    /// Former column name of each row.
    pub row_labels: Vec<String>,
    /// Cells, one row per former column.
    pub rows: Vec<Vec<Cell>>,
}

/// Transpose a compounds-as-rows matrix.
///
/// When `id_column` is present its values become the headers and the
/// remaining columns become rows. Otherwise every column becomes a row and
/// the headers are bare positions `0..n`.
pub fn transpose(raw: &Table, id_column: &str) -> Transposed {
    match raw.column_index(id_column) {
        Some(id) => {
            let headers = raw
                .rows()
                .iter()
                .enumerate()
                .map(|(i, r)| r[id].as_string().unwrap_or_else(|| i.to_string()))
                .collect();
            let (row_labels, rows) = (0..raw.n_columns())
                .filter(|&j| j != id)
                .map(|j| (raw.columns()[j].clone(), column_cells(raw, j)))
                .unzip();
            Transposed {
                headers,
                row_labels,
                rows,
            }
        }
        None => {
            let headers = (0..raw.n_rows()).map(|i| i.to_string()).collect();
            let (row_labels, rows) = (0..raw.n_columns())
                .map(|j| (raw.columns()[j].clone(), column_cells(raw, j)))
                .unzip();
            Transposed {
                headers,
                row_labels,
                rows,
            }
        }
    }
}

fn column_cells(raw: &Table, col: usize) -> Vec<Cell> {
    raw.rows().iter().map(|r| r[col].clone()).collect()
}

/// Promote the first row to the header when the headers are bare integers
/// and at least [`HEADER_MATCH_FRACTION`] of that row looks like compound
/// identifiers. The row is dropped when any promoted value is non-numeric.
///
/// Returns whether the header was replaced.
pub fn recover_header(transposed: &mut Transposed, pattern: &Regex) -> bool {
    let positional = !transposed.headers.is_empty()
        && transposed
            .headers
            .iter()
            .all(|h| !h.is_empty() && h.chars().all(|c| c.is_ascii_digit()));
    if !positional || transposed.rows.is_empty() {
        return false;
    }

    let first = &transposed.rows[0];
    let matched = first
        .iter()
        .filter(|c| c.as_string().map_or(false, |s| pattern.is_match(&s)))
        .count();
    let fraction = matched as f64 / first.len() as f64;
    if fraction < HEADER_MATCH_FRACTION {
        return false;
    }

    let headers: Vec<String> = first
        .iter()
        .zip(&transposed.headers)
        .map(|(cell, old)| cell.as_string().unwrap_or_else(|| old.clone()))
        .collect();
    let is_header_row = first.iter().any(|c| c.to_number().is_none());

    transposed.headers = headers;
    if is_header_row {
        transposed.rows.remove(0);
        transposed.row_labels.remove(0);
    }
    tracing::debug!(
        "Promoted first row to header ({:.0}% compound identifiers)",
        fraction * 100.0
    );
    true
}

/// Build the samples-as-rows feature table.
///
/// Rows are joined with the metadata according to `options.join`. Rows
/// whose sample identifier cannot be resolved are dropped, and every column
/// named with the feature prefix is coerced to numeric.
///
/// With [`JoinStrategy::Position`] a missing class column labels every row
/// [`UNKNOWN_CLASS`] and a missing sample-id column keeps the matrix's own
/// sample names; both raise a warning. [`JoinStrategy::SampleId`] cannot
/// join without a sample-id column and fails with a schema error.
pub fn reconcile(
    raw: &Table,
    metadata: &Table,
    options: &ReconcileOptions,
    diagnostics: &mut Diagnostics,
) -> Result<ReconciledTable> {
    let pattern = options.compound_pattern()?;

    let mut transposed = transpose(raw, &options.compound_id_column);
    recover_header(&mut transposed, &pattern);

    let n_rows = transposed.rows.len();
    let idx: Vec<usize> = (1..=n_rows).collect();

    let sample_col = metadata.column_index(&options.sample_id_column);
    let class_col = metadata.column_index(&options.class_column);
    if class_col.is_none() {
        diagnostics.warn(Warning::UnknownClass {
            reason: format!(
                "'{}' not found in {}",
                options.class_column,
                metadata.name()
            ),
        });
    }
    let class_of = |row: usize| -> Option<String> {
        match class_col {
            Some(c) => metadata.get(row, c).as_string(),
            None => Some(UNKNOWN_CLASS.to_string()),
        }
    };

    let (classes, sample_ids): (Vec<Option<String>>, Vec<Option<String>>) = match options.join {
        JoinStrategy::Position => {
            if sample_col.is_none() {
                diagnostics.warn(Warning::MissingColumn {
                    table: metadata.name().to_string(),
                    column: options.sample_id_column.clone(),
                });
            }
            let n_samples = metadata.n_rows();
            if n_rows > n_samples {
                diagnostics.warn(Warning::TrailingRows {
                    n_rows: n_rows - n_samples,
                });
            } else if n_rows < n_samples {
                diagnostics.warn(Warning::SampleCountMismatch {
                    metadata: n_samples,
                    matrix: n_rows,
                });
            }
            (0..n_rows)
                .map(|i| {
                    if i >= n_samples {
                        return (None, None);
                    }
                    let sample_id = match sample_col {
                        Some(c) => metadata.get(i, c).as_string(),
                        None => Some(transposed.row_labels[i].clone()),
                    };
                    (class_of(i), sample_id)
                })
                .unzip()
        }
        JoinStrategy::SampleId => {
            let sample_col = sample_col.ok_or_else(|| {
                EdaError::Schema(format!(
                    "cannot join by sample identifier: '{}' not found in {}",
                    options.sample_id_column,
                    metadata.name()
                ))
            })?;
            let mut by_id: HashMap<String, usize> = HashMap::new();
            for row in 0..metadata.n_rows() {
                if let Some(id) = metadata.get(row, sample_col).as_string() {
                    by_id.entry(id).or_insert(row);
                }
            }
            transposed
                .row_labels
                .iter()
                .map(|label| match by_id.get(label) {
                    Some(&row) => (class_of(row), Some(label.clone())),
                    None => (None, None),
                })
                .unzip()
        }
    };

    let feature_mask: Vec<bool> = transposed
        .headers
        .iter()
        .map(|h| options.is_feature_column(h))
        .collect();

    let mut kept_idx = Vec::with_capacity(n_rows);
    let mut kept_classes = Vec::with_capacity(n_rows);
    let mut kept_ids = Vec::with_capacity(n_rows);
    let mut kept_values = Vec::with_capacity(n_rows);
    for (i, row) in transposed.rows.into_iter().enumerate() {
        let Some(sample_id) = sample_ids[i].clone() else {
            continue;
        };
        let values = row
            .into_iter()
            .zip(&feature_mask)
            .map(|(cell, &is_feature)| if is_feature { cell.coerce_numeric() } else { cell })
            .collect();
        kept_idx.push(idx[i]);
        kept_classes.push(classes[i].clone());
        kept_ids.push(sample_id);
        kept_values.push(values);
    }

    if kept_ids.is_empty() && n_rows > 0 {
        return Err(EdaError::EmptyData(format!(
            "no reconciled rows matched the metadata in {} (join by {:?} on '{}')",
            metadata.name(),
            options.join,
            options.sample_id_column
        )));
    }

    let dropped = n_rows - kept_ids.len();
    if dropped > 0 {
        diagnostics.warn(Warning::DroppedRows { n_rows: dropped });
    }

    tracing::info!(
        "Reconciled {} samples x {} columns ({} compound columns)",
        kept_ids.len(),
        transposed.headers.len(),
        feature_mask.iter().filter(|&&f| f).count()
    );

    ReconciledTable::new(
        kept_idx,
        kept_classes,
        kept_ids,
        transposed.headers,
        kept_values,
    )
}

/// Prepare the compound dictionary: rename the identifier column to
/// "Name" and the label column to "Label", and attach a 1-based "Idx".
///
/// Fails with a schema error when no "Name" column results.
pub fn prepare_dictionary(table: &Table, options: &ReconcileOptions) -> Result<CompoundDictionary> {
    let mut prepared = table.clone();
    if !prepared.has_column(NAME_COLUMN) {
        prepared.rename_column(&options.compound_id_column, NAME_COLUMN);
    }
    if !prepared.has_column(LABEL_COLUMN) {
        prepared.rename_column(&options.label_column, LABEL_COLUMN);
    }
    if !prepared.has_column(IDX_COLUMN) {
        let idx = (1..=prepared.n_rows())
            .map(|i| Cell::Number(i as f64))
            .collect();
        prepared.push_column(IDX_COLUMN, idx)?;
    }
    CompoundDictionary::new(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn create_matrix() -> Table {
        Table::new(
            "data_matrix",
            vec!["compound_id".into(), "S1".into(), "S2".into(), "S3".into()],
            vec![
                vec![text("compound_001"), Cell::Number(100.0), Cell::Number(150.0), Cell::Number(120.0)],
                vec![text("compound_002"), Cell::Number(200.0), Cell::Number(250.0), Cell::Number(220.0)],
                vec![text("compound_003"), Cell::Number(300.0), text("n/d"), Cell::Number(320.0)],
            ],
        )
        .unwrap()
    }

    fn create_metadata() -> Table {
        Table::new(
            "sample_metadata",
            vec!["sample_id".into(), "Health".into(), "BMI".into()],
            vec![
                vec![text("S1"), text("Healthy"), Cell::Number(22.0)],
                vec![text("S2"), text("Diabetes"), Cell::Number(30.0)],
                vec![text("S3"), text("Healthy"), Cell::Number(25.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_transpose_with_id_column() {
        let t = transpose(&create_matrix(), "compound_id");
        assert_eq!(t.headers, vec!["compound_001", "compound_002", "compound_003"]);
        assert_eq!(t.row_labels, vec!["S1", "S2", "S3"]);
        assert_eq!(t.rows[1][0], Cell::Number(150.0));
    }

    #[test]
    fn test_transpose_without_id_column() {
        let t = transpose(&create_matrix(), "feature");
        assert_eq!(t.headers, vec!["0", "1", "2"]);
        assert_eq!(t.row_labels, vec!["compound_id", "S1", "S2", "S3"]);
        assert_eq!(t.rows[0][2], text("compound_003"));
    }

    #[test]
    fn test_recover_header() {
        let options = ReconcileOptions::default();
        let mut t = transpose(&create_matrix(), "feature");
        assert!(recover_header(&mut t, &options.compound_pattern().unwrap()));

        assert_eq!(t.headers, vec!["compound_001", "compound_002", "compound_003"]);
        // Textual header row dropped
        assert_eq!(t.row_labels, vec!["S1", "S2", "S3"]);
    }

    #[test]
    fn test_recover_header_below_threshold() {
        let matrix = Table::new(
            "m",
            vec!["id".into(), "S1".into()],
            vec![
                vec![text("compound_001"), Cell::Number(1.0)],
                vec![text("glucose"), Cell::Number(2.0)],
            ],
        )
        .unwrap();
        let options = ReconcileOptions::default();
        let mut t = transpose(&matrix, "feature");
        assert!(!recover_header(&mut t, &options.compound_pattern().unwrap()));
        assert_eq!(t.headers, vec!["0", "1"]);
    }

    #[test]
    fn test_reconcile_basic() {
        let mut diag = Diagnostics::new();
        let table = reconcile(
            &create_matrix(),
            &create_metadata(),
            &ReconcileOptions::default(),
            &mut diag,
        )
        .unwrap();

        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.idx(), &[1, 2, 3]);
        assert_eq!(table.sample_ids(), &["S1", "S2", "S3"]);
        let classes: Vec<_> = table.classes().iter().map(|c| c.as_deref()).collect();
        assert_eq!(classes, vec![Some("Healthy"), Some("Diabetes"), Some("Healthy")]);
        assert_eq!(table.n_data_columns(), 3);
        // Non-coercible feature value becomes missing
        assert!(table.get(1, "compound_003").unwrap().is_missing());
        assert!(diag.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let options = ReconcileOptions::default();
        let mut diag = Diagnostics::new();
        let first = reconcile(&create_matrix(), &create_metadata(), &options, &mut diag).unwrap();
        let second = reconcile(&create_matrix(), &create_metadata(), &options, &mut diag).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reconcile_missing_class_column() {
        let metadata = Table::new(
            "sample_metadata",
            vec!["sample_id".into()],
            vec![vec![text("S1")], vec![text("S2")], vec![text("S3")]],
        )
        .unwrap();
        let mut diag = Diagnostics::new();
        let table = reconcile(&create_matrix(), &metadata, &ReconcileOptions::default(), &mut diag)
            .unwrap();

        assert!(table.classes().iter().all(|c| c.as_deref() == Some(UNKNOWN_CLASS)));
        assert_eq!(diag.count(|w| matches!(w, Warning::UnknownClass { .. })), 1);
    }

    #[test]
    fn test_reconcile_trailing_rows_dropped() {
        let metadata = Table::new(
            "sample_metadata",
            vec!["sample_id".into(), "Health".into()],
            vec![vec![text("S1"), text("Healthy")], vec![text("S2"), text("Diabetes")]],
        )
        .unwrap();
        let mut diag = Diagnostics::new();
        let table = reconcile(&create_matrix(), &metadata, &ReconcileOptions::default(), &mut diag)
            .unwrap();

        assert_eq!(table.n_rows(), 2);
        assert!(diag.warnings().contains(&Warning::TrailingRows { n_rows: 1 }));
        assert!(diag.warnings().contains(&Warning::DroppedRows { n_rows: 1 }));
    }

    #[test]
    fn test_reconcile_by_sample_id() {
        // Metadata order differs from matrix order
        let metadata = Table::new(
            "sample_metadata",
            vec!["sample_id".into(), "Health".into()],
            vec![
                vec![text("S3"), text("Diabetes")],
                vec![text("S1"), text("Healthy")],
            ],
        )
        .unwrap();
        let options = ReconcileOptions {
            join: JoinStrategy::SampleId,
            ..ReconcileOptions::default()
        };
        let mut diag = Diagnostics::new();
        let table = reconcile(&create_matrix(), &metadata, &options, &mut diag).unwrap();

        assert_eq!(table.sample_ids(), &["S1", "S3"]);
        assert_eq!(table.classes()[1].as_deref(), Some("Diabetes"));
        assert_eq!(table.idx(), &[1, 3]);
    }

    #[test]
    fn test_sample_id_join_requires_column() {
        let metadata = Table::new("sample_metadata", vec!["Health".into()], vec![]).unwrap();
        let options = ReconcileOptions {
            join: JoinStrategy::SampleId,
            ..ReconcileOptions::default()
        };
        let mut diag = Diagnostics::new();
        let err = reconcile(&create_matrix(), &metadata, &options, &mut diag).unwrap_err();
        assert!(matches!(err, EdaError::Schema(_)));
    }

    fn zero_padded_sheets() -> (Table, Table) {
        let metadata = Table::from_reader(
            "sample_metadata",
            "sample_id\tHealth\n001\tHealthy\n002\tdiabetic\n0012\tHealthy\n".as_bytes(),
            b'\t',
        )
        .unwrap();
        let matrix = Table::from_reader(
            "data_matrix",
            "compound_id\t001\t002\t0012\ncompound_001\t10\t20\t30\ncompound_002\t1\t2\t3\n"
                .as_bytes(),
            b'\t',
        )
        .unwrap();
        (metadata, matrix)
    }

    #[test]
    fn test_zero_padded_ids_position_join() {
        let (metadata, matrix) = zero_padded_sheets();
        let mut diag = Diagnostics::new();
        let table = reconcile(&matrix, &metadata, &ReconcileOptions::default(), &mut diag).unwrap();

        assert_eq!(table.sample_ids(), &["001", "002", "0012"]);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_zero_padded_ids_sample_id_join() {
        let (metadata, matrix) = zero_padded_sheets();
        let options = ReconcileOptions {
            join: JoinStrategy::SampleId,
            ..ReconcileOptions::default()
        };
        let mut diag = Diagnostics::new();
        let table = reconcile(&matrix, &metadata, &options, &mut diag).unwrap();

        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.sample_ids(), &["001", "002", "0012"]);
        assert_eq!(table.classes()[1].as_deref(), Some("diabetic"));
        assert_eq!(table.get(2, "compound_001").unwrap(), &Cell::Number(30.0));
        assert!(diag.is_empty());
    }

    #[test]
    fn test_sample_id_join_without_matches_fails() {
        let metadata = Table::new(
            "sample_metadata",
            vec!["sample_id".into(), "Health".into()],
            vec![vec![text("X1"), text("Healthy")], vec![text("X2"), text("Diabetes")]],
        )
        .unwrap();
        let options = ReconcileOptions {
            join: JoinStrategy::SampleId,
            ..ReconcileOptions::default()
        };
        let mut diag = Diagnostics::new();
        let err = reconcile(&create_matrix(), &metadata, &options, &mut diag).unwrap_err();

        match err {
            EdaError::EmptyData(msg) => assert!(msg.contains("no reconciled rows")),
            other => panic!("expected EmptyData, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_dictionary() {
        let dict = Table::new(
            "data_dictionary",
            vec!["compound_id".into(), "BIOCHEMICAL".into(), "SUPER_PATHWAY".into()],
            vec![
                vec![text("compound_001"), text("Glucose"), text("Carbohydrate")],
                vec![text("compound_002"), text("Lactate"), text("Carbohydrate")],
            ],
        )
        .unwrap();
        let prepared = prepare_dictionary(&dict, &ReconcileOptions::default()).unwrap();

        assert_eq!(prepared.names(), &["compound_001", "compound_002"]);
        assert_eq!(prepared.label("compound_002").as_deref(), Some("Lactate"));
        assert_eq!(
            prepared.cell("compound_001", "SUPER_PATHWAY"),
            Some(&text("Carbohydrate"))
        );
        assert_eq!(prepared.idx("compound_002"), Some(2));
    }

    #[test]
    fn test_prepare_dictionary_without_name() {
        let dict = Table::new("data_dictionary", vec!["BIOCHEMICAL".into()], vec![]).unwrap();
        let err = prepare_dictionary(&dict, &ReconcileOptions::default()).unwrap_err();
        assert!(matches!(err, EdaError::Schema(_)));
    }
}
