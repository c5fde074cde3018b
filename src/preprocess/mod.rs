//! Numeric preprocessing: safe log10, scaling and KNN imputation.
//!
//! The three steps always run in that order and turn the aligned feature
//! columns of a reconciled table into a dense, finite [`AnalysisMatrix`].

pub mod impute;
pub mod log;
pub mod scale;

pub use impute::knn_impute;
pub use log::{min_positive, safe_log10};
pub use scale::{scale, ScaleMethod};

use crate::align::FeatureAlignment;
use crate::config::{defaults, Config};
use crate::data::ReconciledTable;
use crate::diagnostics::Diagnostics;
use crate::error::{EdaError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Options of the preprocessing chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOptions {
    /// Scaling method name; resolved (with fallback) when preprocessing runs.
    pub scale_method: String,
    pub knn_k: usize,
    pub log_offset: f64,
}

impl PreprocessOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scale_method: config.preprocessing.scale_method.clone(),
            knn_k: config.preprocessing.knn_k,
            log_offset: config.preprocessing.log_offset,
        }
    }
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            scale_method: defaults::SCALE_METHOD.to_string(),
            knn_k: defaults::KNN_K,
            log_offset: defaults::LOG_OFFSET,
        }
    }
}

/// Dense, complete samples × features matrix ready for projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMatrix {
    /// Values (samples × features), all finite.
    pub data: DMatrix<f64>,
    /// Feature identifiers, one per column.
    pub feature_ids: Vec<String>,
    /// Sample identifiers, one per row.
    pub sample_ids: Vec<String>,
    /// Scaling method actually applied.
    pub scale_method: ScaleMethod,
    pub knn_k: usize,
}

impl AnalysisMatrix {
    /// Number of samples (rows).
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Number of features (columns).
    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    /// Value at (sample, feature).
    pub fn get(&self, sample: usize, feature: usize) -> f64 {
        self.data[(sample, feature)]
    }

    /// Values of one feature across samples.
    pub fn feature(&self, feature_id: &str) -> Option<Vec<f64>> {
        let j = self.feature_ids.iter().position(|f| f == feature_id)?;
        Some(self.data.column(j).iter().copied().collect())
    }

    /// Write as TSV: a SampleID column followed by one column per feature.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "SampleID")?;
        for id in &self.feature_ids {
            write!(writer, "\t{}", id)?;
        }
        writeln!(writer)?;

        for (i, sample) in self.sample_ids.iter().enumerate() {
            write!(writer, "{}", sample)?;
            for j in 0..self.n_features() {
                write!(writer, "\t{}", self.data[(i, j)])?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Run log10 → scale → impute over a raw samples × features array.
///
/// Returns the processed array and the scaling method that was applied.
/// An unrecognized method name falls back to `auto` with exactly one
/// warning.
pub fn preprocess(
    x: &DMatrix<f64>,
    options: &PreprocessOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(DMatrix<f64>, ScaleMethod)> {
    if x.ncols() == 0 {
        return Err(EdaError::InvalidParameter(
            "no feature columns to preprocess".to_string(),
        ));
    }
    if !(options.log_offset > 0.0 && options.log_offset.is_finite()) {
        return Err(EdaError::InvalidParameter(format!(
            "log offset must be positive, got {}",
            options.log_offset
        )));
    }
    let method = ScaleMethod::resolve(&options.scale_method, diagnostics);

    let logged = safe_log10(x, options.log_offset);
    tracing::debug!(
        "Log10 transform with offset {} (min positive {})",
        options.log_offset,
        min_positive(x)
    );
    let scaled = scale(&logged, method)?;
    let imputed = knn_impute(&scaled, options.knn_k)?;
    tracing::info!(
        "Preprocessed {} x {} matrix (scale={}, k={})",
        imputed.nrows(),
        imputed.ncols(),
        method,
        options.knn_k
    );
    Ok((imputed, method))
}

/// Build the [`AnalysisMatrix`] for the aligned features of a reconciled
/// table.
///
/// Fails with an invalid-parameter error when the alignment is empty.
pub fn build_analysis_matrix(
    table: &ReconciledTable,
    alignment: &FeatureAlignment,
    options: &PreprocessOptions,
    diagnostics: &mut Diagnostics,
) -> Result<AnalysisMatrix> {
    if alignment.is_empty() {
        return Err(EdaError::InvalidParameter(
            "feature list is empty; nothing to preprocess".to_string(),
        ));
    }
    let raw = table.feature_matrix(alignment.features())?;
    let (data, scale_method) = preprocess(&raw, options, diagnostics)?;

    Ok(AnalysisMatrix {
        data,
        feature_ids: alignment.features().to_vec(),
        sample_ids: table.sample_ids().to_vec(),
        scale_method,
        knn_k: options.knn_k,
    })
}
