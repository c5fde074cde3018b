//! Base-10 log transform that tolerates zeros and missing values.

use nalgebra::DMatrix;

/// Floor used when the matrix holds no positive value at all.
pub const MIN_POSITIVE_FALLBACK: f64 = 1e-6;

/// Smallest strictly positive finite value, or [`MIN_POSITIVE_FALLBACK`].
pub fn min_positive(x: &DMatrix<f64>) -> f64 {
    x.iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
        .unwrap_or(MIN_POSITIVE_FALLBACK)
}

/// Replace non-positive, missing and non-finite cells by
/// `min_positive(x) * offset`, then take log10.
///
/// The result is finite everywhere for any positive finite `offset`.
pub fn safe_log10(x: &DMatrix<f64>, offset: f64) -> DMatrix<f64> {
    let floor = min_positive(x) * offset;
    x.map(|v| {
        if v.is_finite() && v > 0.0 {
            v.log10()
        } else {
            floor.log10()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_min_positive() {
        let x = DMatrix::from_row_slice(2, 2, &[0.0, 4.0, -1.0, f64::NAN]);
        assert_relative_eq!(min_positive(&x), 4.0);

        let empty = DMatrix::from_row_slice(1, 2, &[0.0, f64::NAN]);
        assert_relative_eq!(min_positive(&empty), MIN_POSITIVE_FALLBACK);
    }

    #[test]
    fn test_safe_log10_zeros() {
        // Scenario: zeros become log10(minpos * offset)
        let x = DMatrix::from_row_slice(2, 2, &[0.0, 10.0, 100.0, f64::NAN]);
        let y = safe_log10(&x, 0.5);

        assert_relative_eq!(y[(0, 0)], 5.0f64.log10(), epsilon = 1e-12);
        assert_relative_eq!(y[(0, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(y[(1, 0)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(y[(1, 1)], 5.0f64.log10(), epsilon = 1e-12);
    }

    #[test]
    fn test_safe_log10_always_finite() {
        let x = DMatrix::from_row_slice(
            2,
            3,
            &[-5.0, 0.0, f64::INFINITY, f64::NEG_INFINITY, f64::NAN, 1e-300],
        );
        let y = safe_log10(&x, 0.5);
        assert!(y.iter().all(|v| v.is_finite()));
    }
}
