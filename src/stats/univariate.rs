//! Two-class univariate testing per compound.

use crate::align::FeatureAlignment;
use crate::data::{CompoundDictionary, ReconciledTable};
use crate::error::{EdaError, Result};
use crate::labels::{DIABETES, HEALTHY};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Test result for a single compound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnivariateResult {
    /// 1-based dictionary index.
    pub idx: Option<usize>,
    /// Compound identifier.
    pub name: String,
    /// Human-readable compound label.
    pub label: Option<String>,
    /// Observed values in the positive class.
    pub n_pos: usize,
    /// Observed values in the other class.
    pub n_neg: usize,
    pub mean_pos: f64,
    pub mean_neg: f64,
    /// t statistic (parametric) or U of the positive class.
    pub statistic: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Benjamini-Hochberg adjusted p-value.
    pub q_value: f64,
    /// 1 when the positive class mean is higher, else 0.
    pub sign: u8,
}

/// Results of a two-class comparison, in alignment order unless sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnivariateResults {
    pub results: Vec<UnivariateResult>,
    pub posclass: String,
    pub negclass: String,
    pub parametric: bool,
}

impl UnivariateResults {
    /// Number of tested compounds.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Result for a compound.
    pub fn get(&self, name: &str) -> Option<&UnivariateResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Copy sorted by ascending p-value; undefined p-values last.
    pub fn sorted_by_pvalue(&self) -> Self {
        let mut out = self.clone();
        out.results
            .sort_by(|a, b| nan_last(a.p_value).total_cmp(&nan_last(b.p_value)));
        out
    }

    /// Compounds with `p ≤ threshold` that are higher in the positive class.
    pub fn significant(&self, threshold: f64) -> Self {
        let mut out = self.clone();
        out.results
            .retain(|r| r.p_value <= threshold && r.sign == 1);
        out
    }

    /// Write results as TSV.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "Idx\tName\tLabel\tn_{pos}\tn_{neg}\tmean_{pos}\tmean_{neg}\tstatistic\tp_value\tq_value\tSign",
            pos = self.posclass,
            neg = self.negclass
        )?;
        for r in &self.results {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6e}\t{:.6e}\t{}",
                r.idx.map(|i| i.to_string()).unwrap_or_else(|| "NA".to_string()),
                r.name,
                r.label.as_deref().unwrap_or("NA"),
                r.n_pos,
                r.n_neg,
                r.mean_pos,
                r.mean_neg,
                r.statistic,
                r.p_value,
                r.q_value,
                r.sign
            )?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn nan_last(p: f64) -> f64 {
    if p.is_nan() {
        f64::INFINITY
    } else {
        p
    }
}

/// The canonical class compared against `posclass`.
fn opposite_class(posclass: &str) -> Result<&'static str> {
    match posclass {
        DIABETES => Ok(HEALTHY),
        HEALTHY => Ok(DIABETES),
        other => Err(EdaError::InvalidParameter(format!(
            "positive class must be '{}' or '{}', got '{}'",
            DIABETES, HEALTHY, other
        ))),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn variance(values: &[f64], mean: f64) -> f64 {
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0)
}

/// Student's t-test with pooled variance. Returns (t, two-sided p).
pub fn student_t_test(pos: &[f64], neg: &[f64]) -> (f64, f64) {
    let (n1, n2) = (pos.len() as f64, neg.len() as f64);
    if pos.len() < 2 || neg.len() < 2 {
        return (f64::NAN, f64::NAN);
    }
    let (m1, m2) = (mean(pos), mean(neg));
    let df = n1 + n2 - 2.0;
    let pooled = ((n1 - 1.0) * variance(pos, m1) + (n2 - 1.0) * variance(neg, m2)) / df;
    let se = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();
    if !(se > 0.0) {
        return (f64::NAN, f64::NAN);
    }
    let t = (m1 - m2) / se;
    let p = match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
        Err(_) => f64::NAN,
    };
    (t, p)
}

/// Average ranks (1-based) of the pooled sample and the tie term
/// `Σ (t³ − t)` over tie groups.
fn rank_with_ties(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = avg;
        }
        let t = (j - i + 1) as f64;
        tie_term += t * t * t - t;
        i = j + 1;
    }
    (ranks, tie_term)
}

/// Two-sided Mann-Whitney U test using the tie-corrected normal
/// approximation with continuity correction. Returns (U of `pos`, p).
pub fn mann_whitney_u(pos: &[f64], neg: &[f64]) -> (f64, f64) {
    if pos.is_empty() || neg.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let (n1, n2) = (pos.len() as f64, neg.len() as f64);
    let pooled: Vec<f64> = pos.iter().chain(neg).copied().collect();
    let (ranks, tie_term) = rank_with_ties(&pooled);

    let r1: f64 = ranks[..pos.len()].iter().sum();
    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;
    let n = n1 + n2;
    let mu = n1 * n2 / 2.0;
    let sigma = (n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)))).sqrt();
    if !(sigma > 0.0) {
        return (u1, f64::NAN);
    }
    let z = ((u1 - mu).abs() - 0.5).max(0.0) / sigma;
    let p = match Normal::new(0.0, 1.0) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(z))).min(1.0),
        Err(_) => f64::NAN,
    };
    (u1, p)
}

/// Benjamini-Hochberg adjustment. Undefined p-values stay undefined and do
/// not count towards the number of tests.
fn adjust_bh(p_values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..p_values.len())
        .filter(|&i| p_values[i].is_finite())
        .collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let n = order.len() as f64;
    let mut q = vec![f64::NAN; p_values.len()];
    let mut running = 1.0f64;
    for (rank, &i) in order.iter().enumerate().rev() {
        running = running.min(p_values[i] * n / (rank + 1) as f64);
        q[i] = running.min(1.0);
    }
    q
}

/// Compare `posclass` against the other canonical class for each aligned
/// compound, on the reconciled (unprocessed) values.
///
/// Rows of any other class, or without a class, are ignored, as are
/// missing cells. Compounds are reported in alignment order and joined
/// with the dictionary's label and index.
pub fn univariate_2class(
    table: &ReconciledTable,
    dictionary: &CompoundDictionary,
    alignment: &FeatureAlignment,
    posclass: &str,
    parametric: bool,
) -> Result<UnivariateResults> {
    let negclass = opposite_class(posclass)?;

    let is_pos: Vec<Option<bool>> = table
        .classes()
        .iter()
        .map(|c| match c.as_deref() {
            Some(c) if c == posclass => Some(true),
            Some(c) if c == negclass => Some(false),
            _ => None,
        })
        .collect();
    let n_pos = is_pos.iter().filter(|&&g| g == Some(true)).count();
    let n_neg = is_pos.iter().filter(|&&g| g == Some(false)).count();
    if n_pos == 0 || n_neg == 0 {
        return Err(EdaError::EmptyData(format!(
            "two-class test needs samples of both classes ({}: {}, {}: {})",
            posclass, n_pos, negclass, n_neg
        )));
    }

    tracing::info!(
        "Running univariate 2-class test: posclass={} ({} vs {} samples, {})",
        posclass,
        n_pos,
        n_neg,
        if parametric { "t-test" } else { "Mann-Whitney U" }
    );

    let mut results = Vec::with_capacity(alignment.len());
    for name in alignment.features() {
        let values = table.numeric_column(name)?;
        let mut pos = Vec::new();
        let mut neg = Vec::new();
        for (value, group) in values.iter().zip(&is_pos) {
            match (value, group) {
                (Some(v), Some(true)) => pos.push(*v),
                (Some(v), Some(false)) => neg.push(*v),
                _ => {}
            }
        }

        let (mean_pos, mean_neg) = (mean(&pos), mean(&neg));
        let (statistic, p_value) = if parametric {
            student_t_test(&pos, &neg)
        } else {
            mann_whitney_u(&pos, &neg)
        };

        results.push(UnivariateResult {
            idx: dictionary.idx(name),
            name: name.clone(),
            label: dictionary.label(name),
            n_pos: pos.len(),
            n_neg: neg.len(),
            mean_pos,
            mean_neg,
            statistic,
            p_value,
            q_value: f64::NAN,
            sign: u8::from(mean_pos > mean_neg),
        });
    }

    let p_values: Vec<f64> = results.iter().map(|r| r.p_value).collect();
    for (r, q) in results.iter_mut().zip(adjust_bh(&p_values)) {
        r.q_value = q;
    }

    Ok(UnivariateResults {
        results,
        posclass: posclass.to_string(),
        negclass: negclass.to_string(),
        parametric,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align_features;
    use crate::data::{Cell, Table, NAME_COLUMN, LABEL_COLUMN};
    use approx::assert_relative_eq;

    fn create_table() -> ReconciledTable {
        let classes = ["Diabetes", "Diabetes", "Diabetes", "Healthy", "Healthy", "Healthy", "Other"];
        // compound_001 higher in Diabetes, compound_002 lower, compound_003 flat
        let values = vec![
            vec![10.0, 1.0, 5.0],
            vec![11.0, 2.0, 6.0],
            vec![12.0, 1.5, 5.0],
            vec![2.0, 8.0, 6.0],
            vec![3.0, 9.0, 5.0],
            vec![2.5, 8.5, 6.0],
            vec![100.0, 100.0, 100.0],
        ];
        ReconciledTable::new(
            (1..=7).collect(),
            classes.iter().map(|c| Some(c.to_string())).collect(),
            (1..=7).map(|i| format!("S{}", i)).collect(),
            vec!["compound_001".into(), "compound_002".into(), "compound_003".into()],
            values
                .into_iter()
                .map(|r| r.into_iter().map(Cell::Number).collect())
                .collect(),
        )
        .unwrap()
    }

    fn create_dictionary() -> CompoundDictionary {
        let table = Table::new(
            "dict",
            vec![NAME_COLUMN.into(), LABEL_COLUMN.into()],
            vec![
                vec![Cell::Text("compound_001".into()), Cell::Text("glucose".into())],
                vec![Cell::Text("compound_002".into()), Cell::Text("citrate".into())],
                vec![Cell::Text("compound_003".into()), Cell::Text("alanine".into())],
            ],
        )
        .unwrap();
        CompoundDictionary::new(table).unwrap()
    }

    fn run(parametric: bool) -> UnivariateResults {
        let table = create_table();
        let dict = create_dictionary();
        let alignment = align_features(dict.names(), table.data_columns());
        univariate_2class(&table, &dict, &alignment, "Diabetes", parametric).unwrap()
    }

    #[test]
    fn test_t_test_direction_and_join() {
        let results = run(true);
        assert_eq!(results.len(), 3);

        let glucose = results.get("compound_001").unwrap();
        assert_eq!(glucose.label.as_deref(), Some("glucose"));
        assert_eq!(glucose.idx, Some(1));
        assert_eq!(glucose.n_pos, 3);
        assert_eq!(glucose.n_neg, 3);
        assert_relative_eq!(glucose.mean_pos, 11.0);
        assert_eq!(glucose.sign, 1);
        assert!(glucose.p_value < 0.001);

        let citrate = results.get("compound_002").unwrap();
        assert_eq!(citrate.sign, 0);
        assert!(citrate.p_value < 0.001);
    }

    #[test]
    fn test_significant_requires_positive_sign() {
        let significant = run(true).significant(0.05);
        assert_eq!(significant.len(), 1);
        assert_eq!(significant.results[0].name, "compound_001");
    }

    #[test]
    fn test_sorted_by_pvalue() {
        let sorted = run(true).sorted_by_pvalue();
        assert_eq!(sorted.results.last().unwrap().name, "compound_003");
        for pair in sorted.results.windows(2) {
            assert!(pair[0].p_value <= pair[1].p_value);
        }
    }

    #[test]
    fn test_student_t_known_value() {
        // mean diff 3, pooled variance 1, se = sqrt(2/3)
        let (t, p) = student_t_test(&[4.0, 5.0, 6.0], &[1.0, 2.0, 3.0]);
        assert_relative_eq!(t, 3.0 / (2.0f64 / 3.0).sqrt(), epsilon = 1e-10);
        assert!(p > 0.01 && p < 0.03);
    }

    #[test]
    fn test_mann_whitney() {
        let results = run(false);
        let glucose = results.get("compound_001").unwrap();
        // Complete separation: U of the positive class is n1 * n2
        assert_relative_eq!(glucose.statistic, 9.0);
        assert!(glucose.p_value < 0.1);

        let (u, p) = mann_whitney_u(&[1.0, 1.0], &[1.0, 1.0]);
        assert_relative_eq!(u, 2.0);
        assert!(p.is_nan());
    }

    #[test]
    fn test_bh_adjustment() {
        let q = adjust_bh(&[0.01, 0.04, f64::NAN, 0.03]);
        assert_relative_eq!(q[0], 0.03, epsilon = 1e-12);
        assert_relative_eq!(q[1], 0.04, epsilon = 1e-12);
        assert!(q[2].is_nan());
        assert_relative_eq!(q[3], 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_posclass() {
        let table = create_table();
        let dict = create_dictionary();
        let alignment = align_features(dict.names(), table.data_columns());
        assert!(univariate_2class(&table, &dict, &alignment, "Other", true).is_err());
    }

    #[test]
    fn test_write_tsv() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("univariate.tsv");
        run(true).sorted_by_pvalue().to_tsv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Idx\tName\tLabel\tn_Diabetes"));
    }
}
