//! Sample identifier overlap between metadata and the raw matrix.

use crate::data::Table;
use crate::diagnostics::{Diagnostics, Warning};
use crate::reconcile::ReconcileOptions;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Overlap below this percentage raises a warning.
pub const MIN_OVERLAP_PERCENT: f64 = 50.0;

/// How many metadata samples appear as matrix columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub matched: usize,
    pub total: usize,
    pub percent: f64,
}

impl AlignmentReport {
    /// Check if the overlap is below [`MIN_OVERLAP_PERCENT`].
    pub fn is_low(&self) -> bool {
        self.percent < MIN_OVERLAP_PERCENT
    }
}

/// Report the share of distinct metadata sample identifiers that are also
/// matrix column names (the compound identifier column excluded).
///
/// Purely diagnostic. When the metadata has no sample identifier column a
/// warning is recorded and `None` returned.
pub fn validate_alignment(
    metadata: &Table,
    raw: &Table,
    options: &ReconcileOptions,
    diagnostics: &mut Diagnostics,
) -> Option<AlignmentReport> {
    let ids: BTreeSet<String> = match metadata.column(&options.sample_id_column) {
        Ok(cells) => cells.iter().filter_map(|c| c.as_string()).collect(),
        Err(_) => {
            diagnostics.warn(Warning::MissingColumn {
                table: metadata.name().to_string(),
                column: options.sample_id_column.clone(),
            });
            return None;
        }
    };

    let columns: HashSet<&str> = raw
        .columns()
        .iter()
        .map(String::as_str)
        .filter(|c| *c != options.compound_id_column)
        .collect();

    let matched = ids.iter().filter(|id| columns.contains(id.as_str())).count();
    let total = ids.len();
    let percent = if total == 0 {
        0.0
    } else {
        matched as f64 / total as f64 * 100.0
    };
    let report = AlignmentReport {
        matched,
        total,
        percent,
    };

    if report.is_low() {
        diagnostics.warn(Warning::LowSampleOverlap {
            matched,
            total,
            percent,
        });
    } else {
        tracing::info!(
            "Sample alignment: {}/{} ({:.1}%) matched",
            matched,
            total,
            percent
        );
    }
    Some(report)
}
