//! Core TMASK processing modules

pub mod design_matrix;
pub mod robust_regression;
pub mod model;
pub mod median_filter;
pub mod cloud_mask;
pub mod pipeline;
pub mod diagnostics;

// Re-export main types
pub use design_matrix::{build_design_matrix, HarmonicBasis, NUM_PARAMS};
pub use robust_regression::{RegressionResult, Regressors, RobustMethod, RobustParams, RobustRegression};
pub use model::ModelEvaluator;
pub use median_filter::MedianFilter;
pub use cloud_mask::{CloudClassifier, SceneMask, ThresholdPolicy};
pub use pipeline::{fit_model, run_classification, run_fit, FitSummary, SceneReport};
pub use diagnostics::{corner_curves, run_diagnostics, CornerCurve};
