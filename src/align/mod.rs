//! Matching dictionary compounds to reconciled table columns.
//!
//! Matching runs in two typed phases: exact identifier intersection, then
//! intersection on a normalized key. When both come up empty the caller may
//! opt into a capped positional fallback with [`FeatureAlignment::with_fallback`].

mod validate;

pub use validate::{validate_alignment, AlignmentReport};

use crate::data::META_COLUMNS;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which matching phase produced an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Dictionary names equal to column names.
    Exact,
    /// Names equal after key normalization.
    Normalized,
    /// Degraded first-N-columns feature set.
    Fallback,
    /// Nothing matched.
    Unmatched,
}

/// Ordered feature set shared by the dictionary and the reconciled table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAlignment {
    features: Vec<String>,
    strategy: MatchStrategy,
}

impl FeatureAlignment {
    /// Table column names selected as features.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Phase that produced the feature set.
    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if no feature was selected.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Replace an unmatched alignment with the first `cap` non-metadata
    /// columns. Matched alignments are returned unchanged.
    pub fn with_fallback(self, table_columns: &[String], cap: usize) -> Self {
        if self.strategy != MatchStrategy::Unmatched {
            return self;
        }
        let features = table_columns
            .iter()
            .filter(|c| !META_COLUMNS.contains(&c.as_str()))
            .take(cap)
            .cloned()
            .collect();
        Self {
            features,
            strategy: MatchStrategy::Fallback,
        }
    }
}

/// Normalized matching key: trimmed, lowercased, spaces and hyphens
/// replaced by underscores.
pub fn normalize_key(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Select the compounds present both in the dictionary and among the table
/// columns, in dictionary order.
///
/// Exact matches win. Otherwise names are compared on [`normalize_key`] and
/// the table's own spelling is returned, so every feature is guaranteed to
/// be a table column. Duplicates keep their first occurrence.
pub fn align_features(dictionary_names: &[String], table_columns: &[String]) -> FeatureAlignment {
    let columns: HashSet<&str> = table_columns
        .iter()
        .map(String::as_str)
        .filter(|c| !META_COLUMNS.contains(c))
        .collect();

    let exact = dedup(
        dictionary_names
            .iter()
            .filter(|n| columns.contains(n.as_str()))
            .cloned(),
    );
    if !exact.is_empty() {
        tracing::debug!("Exact compound match: {} features", exact.len());
        return FeatureAlignment {
            features: exact,
            strategy: MatchStrategy::Exact,
        };
    }

    let mut by_key: HashMap<String, &str> = HashMap::new();
    for column in table_columns {
        if !META_COLUMNS.contains(&column.as_str()) {
            by_key.entry(normalize_key(column)).or_insert(column);
        }
    }
    let normalized = dedup(
        dictionary_names
            .iter()
            .filter_map(|n| by_key.get(&normalize_key(n)).map(|c| c.to_string())),
    );
    if !normalized.is_empty() {
        tracing::debug!("Normalized compound match: {} features", normalized.len());
        return FeatureAlignment {
            features: normalized,
            strategy: MatchStrategy::Normalized,
        };
    }

    FeatureAlignment {
        features: Vec::new(),
        strategy: MatchStrategy::Unmatched,
    }
}

fn dedup(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names.filter(|n| seen.insert(n.clone())).collect()
}
