//! Pipeline composition and execution for metabolomics preprocessing.

mod runner;

pub use runner::{run_from_config, Pipeline, PipelineOutput, PipelineStep};
