//! Downstream statistics over the pipeline outputs.
//!
//! - **univariate**: two-class t-test / Mann-Whitney U per compound
//! - **pca**: two-component projection of the analysis matrix

pub mod pca;
pub mod univariate;

pub use pca::{pca, pca_for_classes, PcaResult};
pub use univariate::{
    mann_whitney_u, student_t_test, univariate_2class, UnivariateResult, UnivariateResults,
};
