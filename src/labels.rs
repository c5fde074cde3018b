//! Canonicalization of categorical labels (health status, sex).

use crate::data::{Cell, Table};
use crate::diagnostics::{Diagnostics, Warning};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Canonical label of diabetic samples.
pub const DIABETES: &str = "Diabetes";
/// Canonical label of control samples.
pub const HEALTHY: &str = "Healthy";

const HEALTH_MAP: &[(&str, &str)] = &[
    ("diabetic", DIABETES),
    ("Diabetic", DIABETES),
    ("healthy", HEALTHY),
    ("Healthy", HEALTHY),
];

const SEX_MAP: &[(&str, &str)] = &[
    ("male", "M"),
    ("Male", "M"),
    ("m", "M"),
    ("female", "F"),
    ("Female", "F"),
    ("f", "F"),
];

/// Which vocabulary a column is normalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelKind {
    /// Healthy / Diabetes.
    Health,
    /// M / F.
    Sex,
}

impl LabelKind {
    fn mapping(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            LabelKind::Health => HEALTH_MAP,
            LabelKind::Sex => SEX_MAP,
        }
    }
}

/// Look up the canonical form of a raw label.
///
/// The trimmed value is tried as-is first, then lowercased. Returns `None`
/// for values outside the vocabulary.
pub fn canonical_label(value: &str, kind: LabelKind) -> Option<&'static str> {
    let key = value.trim();
    let mapping = kind.mapping();
    let lookup = |k: &str| mapping.iter().find(|(from, _)| *from == k).map(|(_, to)| *to);
    lookup(key).or_else(|| lookup(&key.to_lowercase()))
}

/// Canonical form of a raw label, or the value unchanged.
pub fn normalize_value(value: &str, kind: LabelKind) -> String {
    canonical_label(value, kind)
        .map(String::from)
        .unwrap_or_else(|| value.to_string())
}

/// Rewrite every value of `column` through the vocabulary of `kind`.
///
/// Returns a new table; the input is untouched. Unrecognized values pass
/// through unchanged. A missing column yields an unchanged copy and a
/// [`Warning::MissingColumn`].
pub fn normalize_labels(
    table: &Table,
    column: &str,
    kind: LabelKind,
    diagnostics: &mut Diagnostics,
) -> Table {
    let normalized = table.map_column(column, |cell| match cell {
        Cell::Text(s) => match canonical_label(s, kind) {
            Some(label) => Cell::Text(label.to_string()),
            None => cell.clone(),
        },
        other => other.clone(),
    });

    match normalized {
        Ok(out) => {
            let levels: BTreeSet<String> = out
                .column(column)
                .map(|cells| cells.iter().filter_map(|c| c.as_string()).collect())
                .unwrap_or_default();
            tracing::info!("Normalized {}: {:?}", column, levels);
            out
        }
        Err(_) => {
            diagnostics.warn(Warning::MissingColumn {
                table: table.name().to_string(),
                column: column.to_string(),
            });
            table.clone()
        }
    }
}

/// Normalize a health status column ("diabetic" → "Diabetes").
pub fn normalize_health_status(table: &Table, column: &str, diagnostics: &mut Diagnostics) -> Table {
    normalize_labels(table, column, LabelKind::Health, diagnostics)
}

/// Normalize a class column used for grouping (same vocabulary as health status).
pub fn normalize_class_column(table: &Table, column: &str, diagnostics: &mut Diagnostics) -> Table {
    normalize_labels(table, column, LabelKind::Health, diagnostics)
}

/// Normalize a sex column ("female" → "F").
pub fn normalize_sex(table: &Table, column: &str, diagnostics: &mut Diagnostics) -> Table {
    normalize_labels(table, column, LabelKind::Sex, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_metadata() -> Table {
        Table::new(
            "sample_metadata",
            vec!["sample_id".into(), "HEALTH_STATUS".into(), "sex".into()],
            vec![
                vec![Cell::Text("S1".into()), Cell::Text("diabetic".into()), Cell::Text("male".into())],
                vec![Cell::Text("S2".into()), Cell::Text(" Healthy ".into()), Cell::Text("F".into())],
                vec![Cell::Text("S3".into()), Cell::Text("prediabetic".into()), Cell::Text("FEMALE".into())],
                vec![Cell::Text("S4".into()), Cell::Missing, Cell::Text("x".into())],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_canonical_label() {
        assert_eq!(canonical_label("Diabetic", LabelKind::Health), Some(DIABETES));
        assert_eq!(canonical_label("DIABETIC", LabelKind::Health), Some(DIABETES));
        assert_eq!(canonical_label("Diabetes", LabelKind::Health), None);
        assert_eq!(canonical_label("m", LabelKind::Sex), Some("M"));
        assert_eq!(canonical_label("M", LabelKind::Sex), Some("M"));
        assert_eq!(canonical_label("other", LabelKind::Sex), None);
    }

    #[test]
    fn test_normalize_health_status() {
        let meta = create_metadata();
        let mut diag = Diagnostics::new();
        let out = normalize_health_status(&meta, "HEALTH_STATUS", &mut diag);

        let col = out.column("HEALTH_STATUS").unwrap();
        assert_eq!(col[0], &Cell::Text("Diabetes".into()));
        assert_eq!(col[1], &Cell::Text("Healthy".into()));
        // Unrecognized values pass through
        assert_eq!(col[2], &Cell::Text("prediabetic".into()));
        assert!(col[3].is_missing());
        assert!(diag.is_empty());

        // Input not mutated
        assert_eq!(meta.column("HEALTH_STATUS").unwrap()[0], &Cell::Text("diabetic".into()));
    }

    #[test]
    fn test_normalize_sex() {
        let meta = create_metadata();
        let mut diag = Diagnostics::new();
        let out = normalize_sex(&meta, "sex", &mut diag);

        let col = out.column("sex").unwrap();
        assert_eq!(col[0], &Cell::Text("M".into()));
        assert_eq!(col[1], &Cell::Text("F".into()));
        assert_eq!(col[2], &Cell::Text("F".into()));
        assert_eq!(col[3], &Cell::Text("x".into()));
    }

    #[test]
    fn test_missing_column_warns() {
        let meta = create_metadata();
        let mut diag = Diagnostics::new();
        let out = normalize_class_column(&meta, "Class", &mut diag);

        assert_eq!(out, meta);
        assert_eq!(diag.len(), 1);
        assert!(matches!(diag.warnings()[0], Warning::MissingColumn { .. }));
    }
}
