//! Data structures for metabolomics tables.

mod dataset;
mod dictionary;
mod reconciled;
mod table;

pub use dataset::Dataset;
pub use dictionary::{CompoundDictionary, LABEL_COLUMN, NAME_COLUMN};
pub use reconciled::{
    ReconciledTable, CLASS_COLUMN, IDX_COLUMN, META_COLUMNS, SAMPLE_ID_COLUMN,
};
pub use table::{Cell, Table};
