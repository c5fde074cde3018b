//! Descriptive tables of a study: sample counts per class, sex by class,
//! clinical variables per class and compound counts per super pathway.

use crate::config::Config;
use crate::data::{Dataset, Table};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::Result;
use crate::labels::{normalize_health_status, normalize_sex};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::fmt;

/// Occurrences of one value in a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

/// Occurrences of one (group, level) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCount {
    pub group: String,
    pub level: String,
    pub count: usize,
}

/// Descriptive statistics of a numeric variable within one group.
///
/// `std` is the sample standard deviation and is NaN below two
/// observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: String,
    pub variable: String,
    pub n: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Count non-missing values of a column, most frequent first. Ties keep
/// first-appearance order.
pub fn value_counts(table: &Table, column: &str) -> Result<Vec<ValueCount>> {
    let cells = table.column(column)?;
    Ok(count_in_order(cells.iter().filter_map(|c| c.as_string())))
}

fn count_in_order<I: Iterator<Item = String>>(values: I) -> Vec<ValueCount> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<ValueCount> = Vec::new();
    for value in values {
        match position.get(&value) {
            Some(&i) => counts[i].count += 1,
            None => {
                position.insert(value.clone(), counts.len());
                counts.push(ValueCount { value, count: 1 });
            }
        }
    }
    // sort_by is stable
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Count rows per (group, level) pair, e.g. sex within health status.
/// Rows missing either value are skipped. Groups and levels appear in
/// first-appearance order.
pub fn cross_counts(table: &Table, group_column: &str, level_column: &str) -> Result<Vec<CrossCount>> {
    let groups = table.column(group_column)?;
    let levels = table.column(level_column)?;

    let mut position: HashMap<(String, String), usize> = HashMap::new();
    let mut counts: Vec<CrossCount> = Vec::new();
    for (g, l) in groups.iter().zip(&levels) {
        let (Some(group), Some(level)) = (g.as_string(), l.as_string()) else {
            continue;
        };
        let key = (group, level);
        match position.get(&key) {
            Some(&i) => counts[i].count += 1,
            None => {
                position.insert(key.clone(), counts.len());
                counts.push(CrossCount {
                    group: key.0,
                    level: key.1,
                    count: 1,
                });
            }
        }
    }
    Ok(counts)
}

/// Summarize a numeric column within each group. Non-numeric and missing
/// values are ignored; groups with no numeric value are omitted.
pub fn group_summaries(table: &Table, group_column: &str, variable: &str) -> Result<Vec<GroupSummary>> {
    let groups = table.column(group_column)?;
    let values = table.column(variable)?;

    let mut order: Vec<String> = Vec::new();
    let mut by_group: HashMap<String, Vec<f64>> = HashMap::new();
    for (g, v) in groups.iter().zip(&values) {
        let (Some(group), Some(value)) = (g.as_string(), v.to_number()) else {
            continue;
        };
        by_group
            .entry(group.clone())
            .or_insert_with(|| {
                order.push(group);
                Vec::new()
            })
            .push(value);
    }

    Ok(order
        .into_iter()
        .filter_map(|group| {
            let data = by_group.remove(&group)?;
            Some(GroupSummary {
                variable: variable.to_string(),
                n: data.len(),
                mean: Statistics::mean(data.iter()),
                std: Statistics::std_dev(data.iter()),
                min: Statistics::min(data.iter()),
                max: Statistics::max(data.iter()),
                group,
            })
        })
        .collect())
}

/// All descriptive tables of a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySummary {
    /// Metadata column the samples were grouped by.
    pub group_column: String,
    pub class_counts: Vec<ValueCount>,
    pub sex_by_class: Vec<CrossCount>,
    pub clinical: Vec<GroupSummary>,
    pub pathways: Vec<ValueCount>,
}

impl StudySummary {
    /// Summarize the raw sheets of a dataset.
    ///
    /// Samples are grouped by the health status column when the metadata
    /// has one, otherwise by the class column. Health and sex labels are
    /// normalized first. Absent sex, clinical or pathway columns leave the
    /// matching table empty and raise a [`Warning::MissingColumn`].
    pub fn from_dataset(
        dataset: &Dataset,
        config: &Config,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let columns = &config.columns;
        let group_column = if dataset.metadata.has_column(&columns.health_status) {
            columns.health_status.clone()
        } else {
            columns.class.clone()
        };

        let metadata = normalize_health_status(&dataset.metadata, &group_column, diagnostics);
        let class_counts = value_counts(&metadata, &group_column)?;

        let sex_by_class = if metadata.has_column(&columns.sex) {
            let metadata = normalize_sex(&metadata, &columns.sex, diagnostics);
            cross_counts(&metadata, &group_column, &columns.sex)?
        } else {
            missing(diagnostics, &metadata, &columns.sex);
            Vec::new()
        };

        let mut clinical = Vec::new();
        for variable in [&columns.bmi, &columns.hba1c] {
            if metadata.has_column(variable) {
                clinical.extend(group_summaries(&metadata, &group_column, variable)?);
            } else {
                missing(diagnostics, &metadata, variable);
            }
        }

        let pathways = if dataset.dictionary.has_column(&columns.super_pathway) {
            value_counts(&dataset.dictionary, &columns.super_pathway)?
        } else {
            missing(diagnostics, &dataset.dictionary, &columns.super_pathway);
            Vec::new()
        };

        Ok(Self {
            group_column,
            class_counts,
            sex_by_class,
            clinical,
            pathways,
        })
    }
}

impl fmt::Display for StudySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples by {}", self.group_column)?;
        for c in &self.class_counts {
            writeln!(f, "  {:<20} {}", c.value, c.count)?;
        }

        writeln!(f, "\nSex by {}", self.group_column)?;
        for c in &self.sex_by_class {
            writeln!(f, "  {:<20} {:<6} {}", c.group, c.level, c.count)?;
        }

        writeln!(f, "\nClinical variables by {}", self.group_column)?;
        for s in &self.clinical {
            writeln!(
                f,
                "  {:<20} {:<8} n={:<4} mean={:.2} sd={:.2} min={:.2} max={:.2}",
                s.group, s.variable, s.n, s.mean, s.std, s.min, s.max
            )?;
        }

        writeln!(f, "\nCompounds by super pathway")?;
        for c in &self.pathways {
            writeln!(f, "  {:<30} {}", c.value, c.count)?;
        }
        Ok(())
    }
}

fn missing(diagnostics: &mut Diagnostics, table: &Table, column: &str) {
    diagnostics.warn(Warning::MissingColumn {
        table: table.name().to_string(),
        column: column.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_dataset() -> Dataset {
        let metadata = Table::from_reader(
            "sample_metadata",
            "sample_id\tHealth\tHEALTH_STATUS\tsex\tBMI\thba1c\n\
             S1\tHealthy\thealthy\tfemale\t22\t5.1\n\
             S2\tdiabetic\tdiabetic\tMale\t31\t7.9\n\
             S3\tHealthy\tHealthy\tM\t24\t5.4\n\
             S4\tdiabetic\tDiabetes\tF\t29\tNA\n\
             S5\tHealthy\thealthy\tf\t26\t5.0\n"
                .as_bytes(),
            b'\t',
        )
        .unwrap();
        let matrix = Table::from_reader("data_matrix", "compound_id\tS1\n".as_bytes(), b'\t').unwrap();
        let dictionary = Table::from_reader(
            "data_dictionary",
            "compound_id\tBIOCHEMICAL\tSUPER_PATHWAY\n\
             compound_001\tglucose\tCarbohydrate\n\
             compound_002\tpalmitate\tLipid\n\
             compound_003\toleate\tLipid\n\
             compound_004\tunknown\tNA\n"
                .as_bytes(),
            b'\t',
        )
        .unwrap();
        Dataset::new(metadata, matrix, dictionary)
    }

    #[test]
    fn test_value_counts_order() {
        let table = Table::from_reader("t", "x\nb\na\nb\nc\na\nb\n".as_bytes(), b'\t').unwrap();
        let counts = value_counts(&table, "x").unwrap();
        let flat: Vec<(&str, usize)> = counts.iter().map(|c| (c.value.as_str(), c.count)).collect();
        assert_eq!(flat, vec![("b", 3), ("a", 2), ("c", 1)]);
    }

    #[test]
    fn test_study_summary() {
        let mut diag = Diagnostics::new();
        let summary = StudySummary::from_dataset(&create_dataset(), &Config::default(), &mut diag).unwrap();

        assert_eq!(summary.group_column, "HEALTH_STATUS");
        assert_eq!(
            summary.class_counts,
            vec![
                ValueCount { value: "Healthy".into(), count: 3 },
                ValueCount { value: "Diabetes".into(), count: 2 },
            ]
        );

        assert!(summary.sex_by_class.contains(&CrossCount {
            group: "Healthy".into(),
            level: "F".into(),
            count: 2,
        }));
        assert!(summary.sex_by_class.contains(&CrossCount {
            group: "Diabetes".into(),
            level: "M".into(),
            count: 1,
        }));
        let total: usize = summary.sex_by_class.iter().map(|c| c.count).sum();
        assert_eq!(total, 5);

        assert_eq!(
            summary.pathways,
            vec![
                ValueCount { value: "Lipid".into(), count: 2 },
                ValueCount { value: "Carbohydrate".into(), count: 1 },
            ]
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn test_display() {
        let mut diag = Diagnostics::new();
        let summary = StudySummary::from_dataset(&create_dataset(), &Config::default(), &mut diag).unwrap();
        let text = summary.to_string();

        assert!(text.starts_with("Samples by HEALTH_STATUS"));
        assert!(text.contains("Lipid"));
        assert!(text.contains("mean=24.00"));
    }

    #[test]
    fn test_clinical_summaries() {
        let mut diag = Diagnostics::new();
        let summary = StudySummary::from_dataset(&create_dataset(), &Config::default(), &mut diag).unwrap();

        let bmi_healthy = summary
            .clinical
            .iter()
            .find(|s| s.variable == "BMI" && s.group == "Healthy")
            .unwrap();
        assert_eq!(bmi_healthy.n, 3);
        assert_relative_eq!(bmi_healthy.mean, 24.0);
        assert_relative_eq!(bmi_healthy.std, 2.0);
        assert_relative_eq!(bmi_healthy.min, 22.0);
        assert_relative_eq!(bmi_healthy.max, 26.0);

        // Missing HbA1c reading is skipped
        let hba1c_diabetes = summary
            .clinical
            .iter()
            .find(|s| s.variable == "hba1c" && s.group == "Diabetes")
            .unwrap();
        assert_eq!(hba1c_diabetes.n, 1);
        assert!(hba1c_diabetes.std.is_nan());
    }

    #[test]
    fn test_missing_columns_warn() {
        let dataset = Dataset::new(
            Table::from_reader("sample_metadata", "sample_id\tHealth\nS1\tdiabetic\n".as_bytes(), b'\t')
                .unwrap(),
            Table::from_reader("data_matrix", "compound_id\tS1\n".as_bytes(), b'\t').unwrap(),
            Table::from_reader("data_dictionary", "compound_id\nc1\n".as_bytes(), b'\t').unwrap(),
        );
        let mut diag = Diagnostics::new();
        let summary = StudySummary::from_dataset(&dataset, &Config::default(), &mut diag).unwrap();

        assert_eq!(summary.group_column, "Health");
        assert_eq!(summary.class_counts[0].value, "Diabetes");
        assert!(summary.sex_by_class.is_empty());
        assert!(summary.clinical.is_empty());
        assert!(summary.pathways.is_empty());
        // sex, BMI, hba1c, SUPER_PATHWAY
        assert_eq!(diag.count(|w| matches!(w, Warning::MissingColumn { .. })), 4);
    }
}
