//! Pipeline runner for the reshaping and preprocessing steps.

use crate::align::{
    align_features, validate_alignment, AlignmentReport, FeatureAlignment, MatchStrategy,
};
use crate::config::{defaults, Config};
use crate::data::{CompoundDictionary, Dataset, ReconciledTable, Table};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{EdaError, Result};
use crate::labels::{
    normalize_class_column, normalize_health_status, normalize_sex, normalize_value, LabelKind,
};
use crate::preprocess::{build_analysis_matrix, AnalysisMatrix, PreprocessOptions};
use crate::reconcile::{prepare_dictionary, reconcile, JoinStrategy, ReconcileOptions};
use serde::{Deserialize, Serialize};

/// A step in the pipeline, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineStep {
    /// Report sample identifier overlap between metadata and matrix.
    ValidateAlignment,
    /// Canonicalize class, health status and sex labels in the metadata.
    NormalizeLabels,
    /// Rename dictionary columns and attach Idx.
    PrepareDictionary,
    /// Transpose the matrix and join metadata.
    Reconcile,
    /// Canonicalize class labels of the reconciled table.
    NormalizeClasses,
    /// Match dictionary compounds to table columns.
    AlignFeatures { fallback_cap: Option<usize> },
    /// Log10, scale and impute the aligned features.
    Preprocess,
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Samples-as-rows feature table with normalized classes.
    pub table: ReconciledTable,
    /// Prepared compound dictionary.
    pub dictionary: CompoundDictionary,
    /// Ordered analysis features.
    pub alignment: FeatureAlignment,
    /// Dense, complete matrix over `alignment`.
    pub matrix: AnalysisMatrix,
    /// Sample overlap, absent when metadata has no sample identifier column.
    pub overlap: Option<AlignmentReport>,
    /// Warnings raised during the run.
    pub diagnostics: Diagnostics,
}

/// Builder for configuring and running the pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
    fallback_cap: Option<usize>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Pipeline {
    /// Create from a configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            config: config.clone(),
            fallback_cap: Some(defaults::FALLBACK_FEATURE_CAP),
        }
    }

    /// Set the scaling method name.
    pub fn scale_method(mut self, method: &str) -> Self {
        self.config.preprocessing.scale_method = method.to_string();
        self
    }

    /// Set the number of neighbours for imputation.
    pub fn knn_k(mut self, k: usize) -> Self {
        self.config.preprocessing.knn_k = k;
        self
    }

    /// Set the log floor multiplier.
    pub fn log_offset(mut self, offset: f64) -> Self {
        self.config.preprocessing.log_offset = offset;
        self
    }

    /// Set how matrix rows are joined with metadata.
    pub fn join(mut self, join: JoinStrategy) -> Self {
        self.config.preprocessing.join = join;
        self
    }

    /// Cap of the first-N-columns feature set used when no compound
    /// matches; `None` makes an unmatched alignment fail instead.
    pub fn fallback_cap(mut self, cap: Option<usize>) -> Self {
        self.fallback_cap = cap;
        self
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Steps in execution order.
    pub fn steps(&self) -> Vec<PipelineStep> {
        vec![
            PipelineStep::ValidateAlignment,
            PipelineStep::NormalizeLabels,
            PipelineStep::PrepareDictionary,
            PipelineStep::Reconcile,
            PipelineStep::NormalizeClasses,
            PipelineStep::AlignFeatures {
                fallback_cap: self.fallback_cap,
            },
            PipelineStep::Preprocess,
        ]
    }

    /// Run the pipeline on a dataset.
    pub fn run(&self, dataset: &Dataset) -> Result<PipelineOutput> {
        self.config.validate()?;
        let mut state = PipelineState::new(dataset, &self.config);

        for (i, step) in self.steps().iter().enumerate() {
            tracing::debug!("Step {}: {:?}", i + 1, step);
            state = state.apply(step).map_err(|e| {
                tracing::error!("Step {} ({:?}) failed: {}", i + 1, step, e);
                e
            })?;
        }

        state.finalize()
    }
}

/// Internal state during pipeline execution.
struct PipelineState<'a> {
    config: &'a Config,
    metadata: Table,
    raw: &'a Table,
    raw_dictionary: &'a Table,
    diagnostics: Diagnostics,
    overlap: Option<AlignmentReport>,
    dictionary: Option<CompoundDictionary>,
    table: Option<ReconciledTable>,
    alignment: Option<FeatureAlignment>,
    matrix: Option<AnalysisMatrix>,
}

impl<'a> PipelineState<'a> {
    fn new(dataset: &'a Dataset, config: &'a Config) -> Self {
        Self {
            config,
            metadata: dataset.metadata.clone(),
            raw: &dataset.matrix,
            raw_dictionary: &dataset.dictionary,
            diagnostics: Diagnostics::new(),
            overlap: None,
            dictionary: None,
            table: None,
            alignment: None,
            matrix: None,
        }
    }

    fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions::from_config(self.config)
    }

    fn apply(mut self, step: &PipelineStep) -> Result<Self> {
        match step {
            PipelineStep::ValidateAlignment => {
                let options = self.reconcile_options();
                self.overlap =
                    validate_alignment(&self.metadata, self.raw, &options, &mut self.diagnostics);
            }

            PipelineStep::NormalizeLabels => {
                let columns = &self.config.columns;
                self.metadata =
                    normalize_class_column(&self.metadata, &columns.class, &mut self.diagnostics);
                if columns.health_status != columns.class
                    && self.metadata.has_column(&columns.health_status)
                {
                    self.metadata = normalize_health_status(
                        &self.metadata,
                        &columns.health_status,
                        &mut self.diagnostics,
                    );
                }
                self.metadata = normalize_sex(&self.metadata, &columns.sex, &mut self.diagnostics);
            }

            PipelineStep::PrepareDictionary => {
                self.dictionary = Some(prepare_dictionary(
                    self.raw_dictionary,
                    &self.reconcile_options(),
                )?);
            }

            PipelineStep::Reconcile => {
                let options = self.reconcile_options();
                self.table = Some(reconcile(
                    self.raw,
                    &self.metadata,
                    &options,
                    &mut self.diagnostics,
                )?);
            }

            PipelineStep::NormalizeClasses => {
                let table = self.table.as_ref().ok_or_else(|| {
                    EdaError::Pipeline("Must reconcile before normalizing classes".to_string())
                })?;
                self.table = Some(table.map_classes(|c| normalize_value(c, LabelKind::Health)));
            }

            PipelineStep::AlignFeatures { fallback_cap } => {
                let dictionary = self.dictionary.as_ref().ok_or_else(|| {
                    EdaError::Pipeline("Must prepare dictionary before aligning".to_string())
                })?;
                let table = self.table.as_ref().ok_or_else(|| {
                    EdaError::Pipeline("Must reconcile before aligning".to_string())
                })?;

                let mut alignment = align_features(dictionary.names(), table.data_columns());
                if alignment.strategy() == MatchStrategy::Unmatched {
                    self.diagnostics.warn(Warning::NoCompoundsMatched {
                        dictionary_size: dictionary.names().len(),
                    });
                    if let Some(cap) = fallback_cap {
                        alignment = alignment.with_fallback(table.data_columns(), *cap);
                        self.diagnostics.warn(Warning::FallbackFeatures {
                            n_features: alignment.len(),
                        });
                    }
                }
                tracing::info!(
                    "Matched {}/{} compounds ({:?})",
                    alignment.len(),
                    dictionary.names().len(),
                    alignment.strategy()
                );
                self.alignment = Some(alignment);
            }

            PipelineStep::Preprocess => {
                let table = self.table.as_ref().ok_or_else(|| {
                    EdaError::Pipeline("Must reconcile before preprocessing".to_string())
                })?;
                let alignment = self.alignment.as_ref().ok_or_else(|| {
                    EdaError::Pipeline("Must align features before preprocessing".to_string())
                })?;
                self.matrix = Some(build_analysis_matrix(
                    table,
                    alignment,
                    &PreprocessOptions::from_config(self.config),
                    &mut self.diagnostics,
                )?);
            }
        }
        Ok(self)
    }

    fn finalize(self) -> Result<PipelineOutput> {
        let missing = |what: &str| EdaError::Pipeline(format!("{} not computed", what));
        Ok(PipelineOutput {
            table: self.table.ok_or_else(|| missing("Reconciled table"))?,
            dictionary: self.dictionary.ok_or_else(|| missing("Dictionary"))?,
            alignment: self.alignment.ok_or_else(|| missing("Feature alignment"))?,
            matrix: self.matrix.ok_or_else(|| missing("Analysis matrix"))?,
            overlap: self.overlap,
            diagnostics: self.diagnostics,
        })
    }
}

/// Load the configured sheets and run the full pipeline.
pub fn run_from_config(config: &Config) -> Result<PipelineOutput> {
    let mut load_diagnostics = Diagnostics::new();
    let dataset = Dataset::load(config, &mut load_diagnostics)?;
    let mut output = Pipeline::from_config(config).run(&dataset)?;

    let mut diagnostics = load_diagnostics;
    diagnostics.extend(output.diagnostics);
    output.diagnostics = diagnostics;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Cell;
    use crate::preprocess::ScaleMethod;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn create_dataset() -> Dataset {
        let samples = ["S1", "S2", "S3", "S4", "S5", "S6"];
        let health = ["healthy", "diabetic", "Healthy", "Diabetic", "healthy", "diabetic"];
        let metadata = Table::new(
            "sample_metadata",
            vec!["sample_id".into(), "Health".into(), "sex".into()],
            samples
                .iter()
                .zip(health)
                .enumerate()
                .map(|(i, (s, h))| vec![text(s), text(h), text(if i % 2 == 0 { "male" } else { "f" })])
                .collect(),
        )
        .unwrap();

        let mut columns = vec!["compound_id".to_string()];
        columns.extend(samples.iter().map(|s| s.to_string()));
        let rows = (1..=4)
            .map(|c| {
                let mut row = vec![text(&format!("compound_{:03}", c))];
                row.extend((0..6).map(|s| Cell::Number((c * 100 + s * (c + 3) + (s * s) % 5) as f64)));
                row
            })
            .collect();
        let matrix = Table::new("data_matrix", columns, rows).unwrap();

        let dictionary = Table::new(
            "data_dictionary",
            vec!["compound_id".into(), "BIOCHEMICAL".into()],
            vec![
                vec![text("compound_004"), text("glucose")],
                vec![text("compound_002"), text("lactate")],
                vec![text("compound_001"), text("alanine")],
            ],
        )
        .unwrap();

        Dataset::new(metadata, matrix, dictionary)
    }

    #[test]
    fn test_run_default() {
        let output = Pipeline::default().run(&create_dataset()).unwrap();

        assert_eq!(output.table.n_rows(), 6);
        assert_eq!(output.alignment.strategy(), MatchStrategy::Exact);
        assert_eq!(
            output.alignment.features(),
            &["compound_004", "compound_002", "compound_001"]
        );
        assert_eq!(output.matrix.data.shape(), (6, 3));
        assert!(output.matrix.data.iter().all(|v| v.is_finite()));
        assert_eq!(output.table.classes()[1].as_deref(), Some("Diabetes"));
        assert_eq!(output.overlap.as_ref().unwrap().matched, 6);
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_builder_overrides() {
        let output = Pipeline::default()
            .scale_method("bogus")
            .knn_k(2)
            .run(&create_dataset())
            .unwrap();

        assert_eq!(output.matrix.scale_method, ScaleMethod::Auto);
        assert_eq!(output.matrix.knn_k, 2);
        assert_eq!(output.diagnostics.len(), 1);
    }

    #[test]
    fn test_unmatched_without_fallback_fails() {
        let mut dataset = create_dataset();
        dataset.dictionary = Table::new(
            "data_dictionary",
            vec!["compound_id".into()],
            vec![vec![text("citrate")]],
        )
        .unwrap();

        let err = Pipeline::default()
            .fallback_cap(None)
            .run(&dataset)
            .unwrap_err();
        assert!(matches!(err, EdaError::InvalidParameter(_)));

        let output = Pipeline::default().run(&dataset).unwrap();
        assert_eq!(output.alignment.strategy(), MatchStrategy::Fallback);
        assert_eq!(output.alignment.len(), 4);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Pipeline::default().knn_k(0).run(&create_dataset()).unwrap_err();
        assert!(matches!(err, EdaError::InvalidParameter(_)));
    }

    #[test]
    fn test_output_serializes() {
        let output = Pipeline::default().run(&create_dataset()).unwrap();
        let json = serde_json::to_string(&output).unwrap();
        let parsed: PipelineOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.alignment, output.alignment);
        assert_eq!(parsed.table, output.table);
    }
}
