//! Statistics behind the viewer: feature standardization, PCA, histograms.

pub mod histogram;
pub mod pca;
pub mod scaler;

use thiserror::Error;

pub use histogram::Histogram;
pub use pca::Pca;
pub use scaler::StandardScaler;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("{0} has not been fitted yet")]
    NotFitted(&'static str),
    #[error("expected {expected} features, got {found}")]
    FeatureMismatch { expected: usize, found: usize },
    #[error("need at least {needed} samples, got {found}")]
    TooFewSamples { needed: usize, found: usize },
    #[error("component {index} out of range ({available} fitted)")]
    ComponentOutOfRange { index: usize, available: usize },
    #[error("cannot build a histogram from {0}")]
    EmptyHistogram(&'static str),
    #[error("eigen-solver produced non-finite values")]
    NonFinite,
}
