//! k-nearest-neighbour imputation of missing (NaN) cells.

use crate::error::{EdaError, Result};
use nalgebra::DMatrix;

/// Euclidean distance between two rows over the columns observed in both.
/// Rows sharing no observed column are infinitely far apart.
fn row_distance(x: &DMatrix<f64>, a: usize, b: usize) -> f64 {
    let mut sum = 0.0;
    let mut shared = 0usize;
    for j in 0..x.ncols() {
        let (u, v) = (x[(a, j)], x[(b, j)]);
        if u.is_finite() && v.is_finite() {
            sum += (u - v).powi(2);
            shared += 1;
        }
    }
    if shared == 0 {
        f64::INFINITY
    } else {
        sum.sqrt()
    }
}

/// Fill every non-finite cell with the mean of that column over the `k`
/// nearest other rows observed in it.
///
/// Distances are computed on the input matrix, so the result does not
/// depend on the order cells are filled in. Ties are broken by row order.
/// When fewer than `k` rows are observed in a column all of them are used.
///
/// Fails when `k` is zero or when a column has a missing cell and no
/// observed value.
pub fn knn_impute(x: &DMatrix<f64>, k: usize) -> Result<DMatrix<f64>> {
    if k == 0 {
        return Err(EdaError::InvalidParameter(
            "KNN imputation requires k >= 1".to_string(),
        ));
    }

    let (n_rows, n_cols) = x.shape();
    let mut out = x.clone();
    let mut n_imputed = 0usize;

    for i in 0..n_rows {
        let missing: Vec<usize> = (0..n_cols).filter(|&j| !x[(i, j)].is_finite()).collect();
        if missing.is_empty() {
            continue;
        }

        let mut neighbours: Vec<(usize, f64)> = (0..n_rows)
            .filter(|&r| r != i)
            .map(|r| (r, row_distance(x, i, r)))
            .collect();
        neighbours.sort_by(|a, b| a.1.total_cmp(&b.1));

        for j in missing {
            let donors: Vec<f64> = neighbours
                .iter()
                .map(|&(r, _)| x[(r, j)])
                .filter(|v| v.is_finite())
                .take(k)
                .collect();
            if donors.is_empty() {
                return Err(EdaError::Numerical(format!(
                    "cannot impute column {}: no observed values",
                    j
                )));
            }
            out[(i, j)] = donors.iter().sum::<f64>() / donors.len() as f64;
            n_imputed += 1;
        }
    }

    if n_imputed > 0 {
        tracing::debug!("KNN imputed {} cells with k={}", n_imputed, k);
    }
    Ok(out)
}
