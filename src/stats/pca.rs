//! Two-component principal component projection.

use crate::align::FeatureAlignment;
use crate::data::ReconciledTable;
use crate::diagnostics::Diagnostics;
use crate::error::{EdaError, Result};
use crate::preprocess::{build_analysis_matrix, AnalysisMatrix, PreprocessOptions};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Number of principal components computed.
pub const N_COMPONENTS: usize = 2;

/// Projection of an analysis matrix onto its first two principal components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaResult {
    /// Sample coordinates (samples × 2).
    pub scores: DMatrix<f64>,
    /// Feature loadings (features × 2).
    pub loadings: DMatrix<f64>,
    /// Share of total variance carried by each component.
    pub explained_variance_ratio: Vec<f64>,
    pub sample_ids: Vec<String>,
    pub feature_ids: Vec<String>,
}

impl PcaResult {
    /// Scores of one sample as (PC1, PC2).
    pub fn sample_scores(&self, sample_id: &str) -> Option<(f64, f64)> {
        let i = self.sample_ids.iter().position(|s| s == sample_id)?;
        Some((self.scores[(i, 0)], self.scores[(i, 1)]))
    }
}

/// Column-center the matrix and project it with a thin SVD.
///
/// Each component's sign is fixed so that its largest-magnitude loading is
/// positive. Needs at least two samples and two features.
pub fn pca(matrix: &AnalysisMatrix) -> Result<PcaResult> {
    let x = &matrix.data;
    let (n, p) = x.shape();
    if n.min(p) < N_COMPONENTS {
        return Err(EdaError::InvalidParameter(format!(
            "PCA needs at least {} samples and {} features, got {} x {}",
            N_COMPONENTS, N_COMPONENTS, n, p
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(EdaError::Numerical(
            "PCA input contains non-finite values".to_string(),
        ));
    }

    let mut centered = x.clone();
    for j in 0..p {
        let mean = centered.column(j).mean();
        centered.column_mut(j).add_scalar_mut(-mean);
    }

    let svd = centered.clone().svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| EdaError::Numerical("SVD did not converge".to_string()))?;

    // nalgebra does not order singular values
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

    let total: f64 = svd.singular_values.iter().map(|s| s * s).sum();
    let mut loadings = DMatrix::zeros(p, N_COMPONENTS);
    let mut explained_variance_ratio = Vec::with_capacity(N_COMPONENTS);
    for (c, &k) in order.iter().take(N_COMPONENTS).enumerate() {
        let mut axis: Vec<f64> = v_t.row(k).iter().copied().collect();
        let pivot = axis
            .iter()
            .copied()
            .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            axis.iter_mut().for_each(|v| *v = -*v);
        }
        for (j, v) in axis.into_iter().enumerate() {
            loadings[(j, c)] = v;
        }
        let s = svd.singular_values[k];
        explained_variance_ratio.push(if total > 0.0 { s * s / total } else { 0.0 });
    }

    let scores = &centered * &loadings;
    tracing::info!(
        "PCA: PC1 {:.1}%, PC2 {:.1}% of variance",
        explained_variance_ratio[0] * 100.0,
        explained_variance_ratio[1] * 100.0
    );

    Ok(PcaResult {
        scores,
        loadings,
        explained_variance_ratio,
        sample_ids: matrix.sample_ids.clone(),
        feature_ids: matrix.feature_ids.clone(),
    })
}

/// PCA restricted to samples of the given classes.
///
/// The reconciled table is filtered first and the analysis matrix rebuilt
/// on the remaining rows, so scaling and imputation only see those samples.
/// Returns the filtered table alongside the projection.
pub fn pca_for_classes(
    table: &ReconciledTable,
    alignment: &FeatureAlignment,
    classes: &[&str],
    options: &PreprocessOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(ReconciledTable, PcaResult)> {
    let subset = table.retain_classes(classes);
    if subset.n_rows() == 0 {
        return Err(EdaError::EmptyData(format!(
            "no samples left after keeping classes {:?}",
            classes
        )));
    }
    tracing::info!(
        "PCA on {}/{} samples in classes {:?}",
        subset.n_rows(),
        table.n_rows(),
        classes
    );
    let matrix = build_analysis_matrix(&subset, alignment, options, diagnostics)?;
    let result = pca(&matrix)?;
    Ok((subset, result))
}
