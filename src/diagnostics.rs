//! Non-fatal diagnostics collected while a pipeline runs.
//!
//! Data-quality problems and recovered configuration errors do not abort a
//! run. They are recorded here as typed [`Warning`] values so the caller can
//! surface them, and each one is also emitted through `tracing`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A recoverable condition detected during loading or preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Warning {
    /// A column the step expected is absent; the step was skipped.
    MissingColumn { table: String, column: String },
    /// Metadata and matrix share fewer than half of the sample identifiers.
    LowSampleOverlap {
        matched: usize,
        total: usize,
        percent: f64,
    },
    /// Neither exact nor normalized matching found a shared compound.
    NoCompoundsMatched { dictionary_size: usize },
    /// The degraded first-N-columns feature set was used.
    FallbackFeatures { n_features: usize },
    /// An unrecognized scaling method was replaced by `auto`.
    ScaleMethodFallback { requested: String },
    /// A configured sheet file was not found and the default name was used.
    SheetFallback { requested: String, used: String },
    /// The configuration file was absent; defaults were used.
    ConfigDefaults { path: String },
    /// Metadata class label column unavailable; every row labelled "Unknown".
    UnknownClass { reason: String },
    /// Reconciled rows beyond the metadata sample count carry no identifier.
    TrailingRows { n_rows: usize },
    /// Fewer reconciled rows than metadata samples.
    SampleCountMismatch { metadata: usize, matrix: usize },
    /// Rows dropped because their sample identifier could not be resolved.
    DroppedRows { n_rows: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingColumn { table, column } => {
                write!(f, "column '{}' not found in {}", column, table)
            }
            Warning::LowSampleOverlap {
                matched,
                total,
                percent,
            } => write!(
                f,
                "low sample alignment: {}/{} ({:.1}%) matched",
                matched, total, percent
            ),
            Warning::NoCompoundsMatched { dictionary_size } => write!(
                f,
                "no compound columns matched the {} dictionary names",
                dictionary_size
            ),
            Warning::FallbackFeatures { n_features } => write!(
                f,
                "using the first {} non-metadata columns as features",
                n_features
            ),
            Warning::ScaleMethodFallback { requested } => write!(
                f,
                "invalid scale method '{}', falling back to 'auto' (valid: auto, pareto, vast, level, range)",
                requested
            ),
            Warning::SheetFallback { requested, used } => {
                write!(f, "sheet '{}' not found, using '{}'", requested, used)
            }
            Warning::ConfigDefaults { path } => {
                write!(f, "config file {} not found, using defaults", path)
            }
            Warning::UnknownClass { reason } => {
                write!(f, "class labels unavailable ({}), using 'Unknown'", reason)
            }
            Warning::TrailingRows { n_rows } => write!(
                f,
                "{} matrix rows beyond the metadata sample count have no sample identifier",
                n_rows
            ),
            Warning::SampleCountMismatch { metadata, matrix } => write!(
                f,
                "metadata has {} samples but the matrix has only {} sample rows",
                metadata, matrix
            ),
            Warning::DroppedRows { n_rows } => {
                write!(f, "dropped {} rows without a sample identifier", n_rows)
            }
        }
    }
}

/// Ordered collection of warnings raised during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and emit it through `tracing`.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// All recorded warnings in the order they were raised.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Number of recorded warnings.
    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    /// Check if no warnings were recorded.
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Count warnings matching a predicate.
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Warning) -> bool,
    {
        self.warnings.iter().filter(|w| predicate(w)).count()
    }

    /// Append every warning from another collection.
    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
    }
}
