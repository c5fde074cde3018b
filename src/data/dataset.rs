//! The three input sheets of a study.

use super::table::Table;
use crate::config::{defaults, Config};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{EdaError, Result};
use std::io;
use std::path::PathBuf;

/// Sample metadata, raw compound matrix and compound dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// One row per sample.
    pub metadata: Table,
    /// Compounds as rows, samples as columns.
    pub matrix: Table,
    /// One row per compound.
    pub dictionary: Table,
    sources: Vec<PathBuf>,
}

impl Dataset {
    /// Build a dataset from in-memory tables.
    pub fn new(metadata: Table, matrix: Table, dictionary: Table) -> Self {
        Self {
            metadata,
            matrix,
            dictionary,
            sources: Vec::new(),
        }
    }

    /// Load the three sheets named in the configuration.
    ///
    /// A sheet that cannot be found under its configured name is looked up
    /// under its default name before giving up.
    pub fn load(config: &Config, diagnostics: &mut Diagnostics) -> Result<Self> {
        let sheets = &config.data.sheets;
        let metadata_path = resolve_sheet(
            config,
            &sheets.metadata,
            defaults::METADATA_SHEET,
            diagnostics,
        )?;
        let matrix_path =
            resolve_sheet(config, &sheets.matrix, defaults::MATRIX_SHEET, diagnostics)?;
        let dictionary_path = resolve_sheet(
            config,
            &sheets.dictionary,
            defaults::DICTIONARY_SHEET,
            diagnostics,
        )?;

        tracing::info!("Loading data from {}", config.data.path.display());
        let metadata = Table::from_delimited(&metadata_path)?;
        let matrix = Table::from_delimited(&matrix_path)?;
        let dictionary = Table::from_delimited(&dictionary_path)?;
        tracing::info!(
            "Loaded: meta=({}, {}), matrix=({}, {}), dict=({}, {})",
            metadata.n_rows(),
            metadata.n_columns(),
            matrix.n_rows(),
            matrix.n_columns(),
            dictionary.n_rows(),
            dictionary.n_columns()
        );

        Ok(Self {
            metadata,
            matrix,
            dictionary,
            sources: vec![metadata_path, matrix_path, dictionary_path],
        })
    }

    /// Files the dataset was read from, empty for in-memory datasets.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

fn resolve_sheet(
    config: &Config,
    sheet: &str,
    default: &str,
    diagnostics: &mut Diagnostics,
) -> Result<PathBuf> {
    if let Some(path) = config.sheet_path(sheet) {
        return Ok(path);
    }
    if sheet != default {
        if let Some(path) = config.sheet_path(default) {
            diagnostics.warn(Warning::SheetFallback {
                requested: sheet.to_string(),
                used: default.to_string(),
            });
            return Ok(path);
        }
    }
    Err(EdaError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!(
            "sheet '{}' not found in {}",
            sheet,
            config.data.path.display()
        ),
    )))
}
