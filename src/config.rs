//! Analysis configuration.
//!
//! A [`Config`] value is loaded once and passed explicitly to the pipeline.
//! Every section is optional in YAML; absent keys take the values in
//! [`defaults`].

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{EdaError, Result};
use crate::reconcile::JoinStrategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration values.
pub mod defaults {
    pub const DATA_PATH: &str = "data";
    pub const METADATA_SHEET: &str = "sample_metadata";
    pub const MATRIX_SHEET: &str = "data_matrix";
    pub const DICTIONARY_SHEET: &str = "data_dictionary";

    pub const SAMPLE_ID_COLUMN: &str = "sample_id";
    pub const CLASS_COLUMN: &str = "Health";
    pub const HEALTH_STATUS_COLUMN: &str = "HEALTH_STATUS";
    pub const SEX_COLUMN: &str = "sex";
    pub const COMPOUND_ID_COLUMN: &str = "compound_id";
    pub const LABEL_COLUMN: &str = "BIOCHEMICAL";
    pub const FEATURE_PREFIX: &str = "compound_";
    pub const BMI_COLUMN: &str = "BMI";
    pub const HBA1C_COLUMN: &str = "hba1c";
    pub const SUPER_PATHWAY_COLUMN: &str = "SUPER_PATHWAY";

    pub const SCALE_METHOD: &str = "auto";
    pub const KNN_K: usize = 3;
    pub const LOG_OFFSET: f64 = 0.5;

    pub const PARAMETRIC: bool = true;
    pub const PVALUE_THRESHOLD: f64 = 0.05;

    /// Cap on the degraded first-N-columns feature set.
    pub const FALLBACK_FEATURE_CAP: usize = 100;
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub columns: ColumnConfig,
    pub preprocessing: PreprocessingConfig,
    pub stats: StatsConfig,
}

/// Location of the three input sheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding one delimited file per sheet.
    pub path: PathBuf,
    pub sheets: SheetConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::DATA_PATH),
            sheets: SheetConfig::default(),
        }
    }
}

/// Sheet names (file stems).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    pub metadata: String,
    pub matrix: String,
    pub dictionary: String,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            metadata: defaults::METADATA_SHEET.to_string(),
            matrix: defaults::MATRIX_SHEET.to_string(),
            dictionary: defaults::DICTIONARY_SHEET.to_string(),
        }
    }
}

/// Column names in the source sheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    /// Sample identifier column in the metadata sheet.
    pub sample_id: String,
    /// Class label column in the metadata sheet joined into "Class".
    pub class: String,
    /// Health status column rewritten by label normalization.
    pub health_status: String,
    /// Sex column rewritten by label normalization.
    pub sex: String,
    /// Compound identifier column in the matrix and dictionary sheets.
    pub compound_id: String,
    /// Human-readable compound name column in the dictionary sheet.
    pub label: String,
    /// Prefix shared by compound identifiers (`compound_0001`, ...).
    pub feature_prefix: String,
    /// Clinical variables summarized per class.
    pub bmi: String,
    pub hba1c: String,
    /// Biochemical class column in the dictionary sheet.
    pub super_pathway: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            sample_id: defaults::SAMPLE_ID_COLUMN.to_string(),
            class: defaults::CLASS_COLUMN.to_string(),
            health_status: defaults::HEALTH_STATUS_COLUMN.to_string(),
            sex: defaults::SEX_COLUMN.to_string(),
            compound_id: defaults::COMPOUND_ID_COLUMN.to_string(),
            label: defaults::LABEL_COLUMN.to_string(),
            feature_prefix: defaults::FEATURE_PREFIX.to_string(),
            bmi: defaults::BMI_COLUMN.to_string(),
            hba1c: defaults::HBA1C_COLUMN.to_string(),
            super_pathway: defaults::SUPER_PATHWAY_COLUMN.to_string(),
        }
    }
}

/// Numeric preprocessing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// One of auto, pareto, vast, level, range. Anything else falls back to auto.
    pub scale_method: String,
    pub knn_k: usize,
    pub log_offset: f64,
    pub join: JoinStrategy,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            scale_method: defaults::SCALE_METHOD.to_string(),
            knn_k: defaults::KNN_K,
            log_offset: defaults::LOG_OFFSET,
            join: JoinStrategy::default(),
        }
    }
}

/// Univariate testing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub parametric: bool,
    pub pvalue_threshold: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            parametric: defaults::PARAMETRIC,
            pvalue_threshold: defaults::PVALUE_THRESHOLD,
        }
    }
}

impl Config {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(EdaError::from)
    }

    /// Load from a YAML file, using defaults when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P, diagnostics: &mut Diagnostics) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            diagnostics.warn(Warning::ConfigDefaults {
                path: path.display().to_string(),
            });
            return Ok(Self::default());
        }
        let config = Self::from_yaml(&std::fs::read_to_string(path)?)?;
        tracing::info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Reject values no stage can recover from.
    ///
    /// The scale method is not checked here; unknown names fall back to
    /// `auto` when the preprocessor resolves them.
    pub fn validate(&self) -> Result<()> {
        if self.preprocessing.knn_k == 0 {
            return Err(EdaError::InvalidParameter(
                "preprocessing.knn_k must be a positive integer".to_string(),
            ));
        }
        if !(self.preprocessing.log_offset > 0.0 && self.preprocessing.log_offset.is_finite()) {
            return Err(EdaError::InvalidParameter(format!(
                "preprocessing.log_offset must be positive, got {}",
                self.preprocessing.log_offset
            )));
        }
        let p = self.stats.pvalue_threshold;
        if !(p > 0.0 && p <= 1.0) {
            return Err(EdaError::InvalidParameter(format!(
                "stats.pvalue_threshold must be in (0, 1], got {}",
                p
            )));
        }
        if self.columns.feature_prefix.is_empty() {
            return Err(EdaError::InvalidParameter(
                "columns.feature_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of a sheet file with the given stem, trying `.tsv`, `.csv`
    /// and `.txt`. Returns `None` when none exists.
    pub fn sheet_path(&self, sheet: &str) -> Option<PathBuf> {
        ["tsv", "csv", "txt"]
            .iter()
            .map(|ext| self.data.path.join(format!("{}.{}", sheet, ext)))
            .find(|p| p.is_file())
    }
}
