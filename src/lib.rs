//! Metabolomics EDA preprocessing library
//!
//! This library reshapes the three loosely-structured sheets of a
//! metabolomics study (sample metadata, compound intensity matrix, compound
//! dictionary) into one analysis-ready numeric feature matrix.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (Table, CompoundDictionary, ReconciledTable)
//! - **labels**: Canonical class and sex labels
//! - **reconcile**: Transpose, header recovery and metadata join
//! - **align**: Compound matching and sample overlap validation
//! - **preprocess**: Safe log10, scaling and KNN imputation
//! - **stats**: Two-class univariate tests and PCA
//! - **summary**: Class counts, clinical summaries and pathway counts
//! - **cache**: Content-addressed result cache
//! - **pipeline**: Pipeline composition and execution
//!
//! # Example
//!
//! ```no_run
//! use metabo_eda::prelude::*;
//!
//! let mut diagnostics = Diagnostics::new();
//! let config = Config::load("config.yaml", &mut diagnostics).unwrap();
//! let dataset = Dataset::load(&config, &mut diagnostics).unwrap();
//!
//! let output = Pipeline::from_config(&config)
//!     .scale_method("pareto")
//!     .run(&dataset)
//!     .unwrap();
//!
//! let projection = pca(&output.matrix).unwrap();
//! let tests = univariate_2class(
//!     &output.table,
//!     &output.dictionary,
//!     &output.alignment,
//!     "Diabetes",
//!     true,
//! )
//! .unwrap();
//! ```

pub mod align;
pub mod cache;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod labels;
pub mod pipeline;
pub mod preprocess;
pub mod reconcile;
pub mod stats;
pub mod summary;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::align::{
        align_features, normalize_key, validate_alignment, AlignmentReport, FeatureAlignment,
        MatchStrategy,
    };
    pub use crate::cache::ResultCache;
    pub use crate::config::Config;
    pub use crate::data::{Cell, CompoundDictionary, Dataset, ReconciledTable, Table};
    pub use crate::diagnostics::{Diagnostics, Warning};
    pub use crate::error::{EdaError, Result};
    pub use crate::labels::{
        normalize_class_column, normalize_health_status, normalize_sex, DIABETES, HEALTHY,
    };
    pub use crate::pipeline::{run_from_config, Pipeline, PipelineOutput, PipelineStep};
    pub use crate::preprocess::{
        build_analysis_matrix, knn_impute, preprocess, safe_log10, scale, AnalysisMatrix,
        PreprocessOptions, ScaleMethod,
    };
    pub use crate::reconcile::{prepare_dictionary, reconcile, JoinStrategy, ReconcileOptions};
    pub use crate::stats::{pca, pca_for_classes, univariate_2class, PcaResult, UnivariateResults};
    pub use crate::summary::StudySummary;
}
