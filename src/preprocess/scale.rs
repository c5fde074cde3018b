//! Column-wise scaling of a samples × features matrix.
//!
//! Statistics are computed over the finite cells of each column only; NaN
//! cells stay NaN. Standard deviations use `n - 1` in the denominator.
//!
//! | method | formula |
//! |--------|---------|
//! | auto   | (x − μ) / σ |
//! | pareto | (x − μ) / √σ |
//! | vast   | ((x − μ) / σ) · (μ / σ) |
//! | level  | (x − μ) / μ |
//! | range  | (x − min) / (max − min) |

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{EdaError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scaling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMethod {
    /// Unit variance (z-score).
    #[default]
    Auto,
    /// Square root of the standard deviation.
    Pareto,
    /// Variance stability.
    Vast,
    /// Relative to the mean.
    Level,
    /// Min-max to [0, 1].
    Range,
}

impl ScaleMethod {
    /// Parse a method name, accepting common aliases. Case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "auto" | "zscore" | "z-score" | "standard" | "standardize" | "std" => Some(Self::Auto),
            "pareto" | "paretto" => Some(Self::Pareto),
            "vast" => Some(Self::Vast),
            "level" | "mean" => Some(Self::Level),
            "range" | "minmax" | "min-max" | "min_max" => Some(Self::Range),
            _ => None,
        }
    }

    /// Parse a method name, falling back to [`ScaleMethod::Auto`] with a
    /// [`Warning::ScaleMethodFallback`] when it is not recognized.
    pub fn resolve(name: &str, diagnostics: &mut Diagnostics) -> Self {
        match Self::from_name(name) {
            Some(method) => method,
            None => {
                diagnostics.warn(Warning::ScaleMethodFallback {
                    requested: name.to_string(),
                });
                Self::Auto
            }
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Pareto => "pareto",
            Self::Vast => "vast",
            Self::Level => "level",
            Self::Range => "range",
        }
    }
}

impl fmt::Display for ScaleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of the finite cells of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ColumnStats {
    mean: f64,
    std: f64,
    min: f64,
    max: f64,
}

fn column_stats(values: impl Iterator<Item = f64>) -> Option<ColumnStats> {
    let observed: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if observed.is_empty() {
        return None;
    }
    let n = observed.len() as f64;
    let mean = observed.iter().sum::<f64>() / n;
    let std = if observed.len() > 1 {
        (observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        f64::NAN
    };
    let min = observed.iter().copied().fold(f64::INFINITY, f64::min);
    let max = observed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(ColumnStats {
        mean,
        std,
        min,
        max,
    })
}

fn check_divisor(value: f64, what: &str, column: usize) -> Result<f64> {
    if value.is_finite() && value != 0.0 {
        Ok(value)
    } else {
        Err(EdaError::Numerical(format!(
            "cannot scale column {}: {} is {}",
            column, what, value
        )))
    }
}

/// Scale each column of `x` with `method`.
///
/// Fails with a numerical error when a column's divisor is zero or
/// undefined (constant column, fewer than two observed values, zero mean
/// for `level`, or a column with no observed value).
pub fn scale(x: &DMatrix<f64>, method: ScaleMethod) -> Result<DMatrix<f64>> {
    let mut out = x.clone();
    for j in 0..x.ncols() {
        let stats = column_stats(x.column(j).iter().copied()).ok_or_else(|| {
            EdaError::Numerical(format!("cannot scale column {}: no observed values", j))
        })?;

        let f: Box<dyn Fn(f64) -> f64> = match method {
            ScaleMethod::Auto => {
                let sd = check_divisor(stats.std, "standard deviation", j)?;
                Box::new(move |v| (v - stats.mean) / sd)
            }
            ScaleMethod::Pareto => {
                let root = check_divisor(stats.std.sqrt(), "sqrt of standard deviation", j)?;
                Box::new(move |v| (v - stats.mean) / root)
            }
            ScaleMethod::Vast => {
                let sd = check_divisor(stats.std, "standard deviation", j)?;
                Box::new(move |v| ((v - stats.mean) / sd) * (stats.mean / sd))
            }
            ScaleMethod::Level => {
                let mean = check_divisor(stats.mean, "mean", j)?;
                Box::new(move |v| (v - mean) / mean)
            }
            ScaleMethod::Range => {
                let width = check_divisor(stats.max - stats.min, "range", j)?;
                Box::new(move |v| (v - stats.min) / width)
            }
        };

        for v in out.column_mut(j).iter_mut() {
            if v.is_finite() {
                *v = f(*v);
            }
        }
    }
    Ok(out)
}
