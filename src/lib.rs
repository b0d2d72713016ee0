//! TMASK: time-series cloud and cloud-shadow masking
//!
//! This library fits a per-pixel harmonic reflectance model to a stack of
//! multi-temporal optical images with robust regression, then flags
//! observations that deviate from the model as cloud (brighter) or cloud
//! shadow (darker).

pub mod types;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    Band, GeoTransform, RasterGeometry, ReflectanceStack, ThresholdMode, TmaskError, TmaskResult,
};

pub use config::{TmaskConfig, TmaskPaths};
pub use io::{CoefficientStore, GeoTiffWriter, StackReader};
pub use crate::core::{run_classification, run_diagnostics, run_fit, RobustMethod};

#[cfg(feature = "python")]
mod python {
    use crate::core::{build_design_matrix, ModelEvaluator, RobustMethod, RobustRegression};
    use numpy::{IntoPyArray, PyArray2, PyArray3, PyArray4, PyReadonlyArray4, PyReadonlyArrayDyn};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    fn value_error(e: crate::TmaskError) -> PyErr {
        PyErr::new::<PyValueError, _>(format!("{}", e))
    }

    /// Harmonic design matrix (params x dates) for ascending ordinal dates
    #[pyfunction]
    fn harmonic_design_matrix(py: Python<'_>, dates: Vec<f64>) -> PyResult<&PyArray2<f64>> {
        let (_, x) = build_design_matrix(&dates).map_err(value_error)?;
        Ok(x.into_pyarray(py))
    }

    /// Robust per-pixel fit; returns (coeffs, adj_rsq, num_iter, rmse)
    #[pyfunction]
    #[pyo3(signature = (x, y, method = "bisquare", null_value = None, per_pixel_x = false))]
    #[allow(clippy::type_complexity)]
    fn robust_fit<'py>(
        py: Python<'py>,
        x: PyReadonlyArrayDyn<'py, f64>,
        y: PyReadonlyArrayDyn<'py, f64>,
        method: &str,
        null_value: Option<f64>,
        per_pixel_x: bool,
    ) -> PyResult<(
        &'py PyArray3<f64>,
        &'py PyArray2<f64>,
        &'py PyArray2<u32>,
        &'py PyArray2<f64>,
    )> {
        let method: RobustMethod = method.parse().map_err(value_error)?;
        let result = RobustRegression::new(method)
            .fit_dyn(x.as_array(), y.as_array(), per_pixel_x, null_value)
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("{}", e)))?;

        Ok((
            result.coeffs.into_pyarray(py),
            result.adj_rsq.into_pyarray(py),
            result.num_iter.into_pyarray(py),
            result.rmse.into_pyarray(py),
        ))
    }

    /// Predicted reflectance (dates x bands x rows x cols) from stored coefficients
    #[pyfunction]
    fn predict<'py>(
        py: Python<'py>,
        training_dates: Vec<f64>,
        dates: Vec<f64>,
        coeffs: PyReadonlyArray4<'py, f32>,
    ) -> PyResult<&'py PyArray4<f32>> {
        let evaluator = ModelEvaluator::from_training_dates(&training_dates).map_err(value_error)?;
        let predicted = evaluator
            .predict(&dates, &coeffs.as_array().to_owned())
            .map_err(value_error)?;
        Ok(predicted.into_pyarray(py))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(harmonic_design_matrix, m)?)?;
        m.add_function(wrap_pyfunction!(robust_fit, m)?)?;
        m.add_function(wrap_pyfunction!(predict, m)?)?;
        Ok(())
    }
}
