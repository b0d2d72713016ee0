//! Per-pixel robust linear regression through an image stack.
//!
//! Each pixel's time series is fitted independently with iteratively
//! reweighted least squares: an ordinary least squares start, then repeated
//! weighted solves where the weights come from an influence function applied
//! to leverage-adjusted residuals scaled by a median absolute deviation.
//!
//! Pixels with fewer usable observations than parameters, or whose initial
//! system is singular, produce NaN coefficients and statistics. They never
//! abort the batch.

use crate::types::{TmaskError, TmaskResult};
use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, ArrayView4, ArrayViewD, Ix2, Ix3, Ix4};
use serde::{Deserialize, Serialize};

/// Normalisation of the median absolute deviation to a Gaussian sigma
const MAD_TO_SIGMA: f64 = 0.6745;

/// Leverage cap used when adjusting residuals
const MAX_LEVERAGE: f64 = 0.9999;

/// Relative pivot size below which the normal equations count as singular
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Dispersion (relative to the data magnitude) treated as an exact fit
const EXACT_FIT_SCALE: f64 = 1e-7;

/// Weight functions available for the reweighting step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobustMethod {
    /// Tukey bisquare
    Bisquare,
    Cauchy,
    Fair,
    Huber,
    /// Ordinary least squares (no reweighting)
    Ols,
    Welsch,
}

impl RobustMethod {
    /// Default tuning constant (95% Gaussian efficiency)
    pub fn tuning_constant(self) -> f64 {
        match self {
            RobustMethod::Bisquare => 4.685,
            RobustMethod::Cauchy => 2.385,
            RobustMethod::Fair => 1.400,
            RobustMethod::Huber => 1.345,
            RobustMethod::Ols => 1.0,
            RobustMethod::Welsch => 2.985,
        }
    }

    /// Weight for a residual already divided by `tuning * sigma`
    pub fn weight(self, u: f64) -> f64 {
        let t = u.abs();
        match self {
            RobustMethod::Bisquare => {
                if t < 1.0 {
                    let v = 1.0 - t * t;
                    v * v
                } else {
                    0.0
                }
            }
            RobustMethod::Cauchy => 1.0 / (1.0 + u * u),
            RobustMethod::Fair => 1.0 / (1.0 + t),
            RobustMethod::Huber => {
                if t <= 1.0 {
                    1.0
                } else {
                    1.0 / t
                }
            }
            RobustMethod::Ols => 1.0,
            RobustMethod::Welsch => (-u * u).exp(),
        }
    }
}

impl std::str::FromStr for RobustMethod {
    type Err = TmaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bisquare" | "tukey" => Ok(RobustMethod::Bisquare),
            "cauchy" => Ok(RobustMethod::Cauchy),
            "fair" => Ok(RobustMethod::Fair),
            "huber" => Ok(RobustMethod::Huber),
            "ols" => Ok(RobustMethod::Ols),
            "welsch" => Ok(RobustMethod::Welsch),
            _ => Err(TmaskError::Configuration(format!(
                "Unknown robust regression method: {}",
                s
            ))),
        }
    }
}

/// Independent variables of the regression
#[derive(Debug, Clone, Copy)]
pub enum Regressors<'a> {
    /// Same regressors for every pixel (params x images)
    Shared(ArrayView2<'a, f64>),
    /// Regressors that vary per pixel (params x images x rows x cols)
    PerPixel(ArrayView4<'a, f64>),
}

impl<'a> Regressors<'a> {
    /// Interpret a dynamically-shaped array, checking its dimensionality
    pub fn from_dyn(x: ArrayViewD<'a, f64>, per_pixel: bool) -> TmaskResult<Self> {
        if per_pixel {
            let shape = x.shape().to_vec();
            x.into_dimensionality::<Ix4>()
                .map(Regressors::PerPixel)
                .map_err(|_| {
                    TmaskError::Shape(format!(
                        "X variable has shape {:?} with per-pixel regressors; it should be 4-d",
                        shape
                    ))
                })
        } else {
            let shape = x.shape().to_vec();
            x.into_dimensionality::<Ix2>()
                .map(Regressors::Shared)
                .map_err(|_| {
                    TmaskError::Shape(format!(
                        "X variable has shape {:?} with shared regressors; it should be 2-d",
                        shape
                    ))
                })
        }
    }

    pub fn num_params(&self) -> usize {
        match self {
            Regressors::Shared(x) => x.nrows(),
            Regressors::PerPixel(x) => x.shape()[0],
        }
    }

    pub fn num_images(&self) -> usize {
        match self {
            Regressors::Shared(x) => x.ncols(),
            Regressors::PerPixel(x) => x.shape()[1],
        }
    }

    fn value(&self, param: usize, image: usize, row: usize, col: usize) -> f64 {
        match self {
            Regressors::Shared(x) => x[[param, image]],
            Regressors::PerPixel(x) => x[[param, image, row, col]],
        }
    }
}

/// Iteration controls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustParams {
    /// Upper bound on reweighting iterations
    pub max_iterations: usize,
    /// Relative coefficient change that counts as converged
    pub tolerance: f64,
}

impl Default for RobustParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: f64::EPSILON.sqrt(),
        }
    }
}

/// Fit outcome for one pixel
#[derive(Debug, Clone, PartialEq)]
pub struct PixelFit {
    pub coeffs: Vec<f64>,
    pub adj_rsq: f64,
    pub num_iter: u32,
    pub rmse: f64,
}

impl PixelFit {
    /// Sentinel for pixels that could not be fitted
    pub fn undefined(num_params: usize) -> Self {
        Self {
            coeffs: vec![f64::NAN; num_params],
            adj_rsq: f64::NAN,
            num_iter: 0,
            rmse: f64::NAN,
        }
    }
}

/// Stack-wide regression output
#[derive(Debug, Clone)]
pub struct RegressionResult {
    /// Coefficients (params x rows x cols)
    pub coeffs: Array3<f64>,
    /// Adjusted R-squared (rows x cols)
    pub adj_rsq: Array2<f64>,
    /// Reweighting iterations (rows x cols)
    pub num_iter: Array2<u32>,
    /// Root mean square residual (rows x cols)
    pub rmse: Array2<f64>,
}

impl RegressionResult {
    /// Pixels carrying the NaN sentinel
    pub fn undefined_pixels(&self) -> usize {
        self.rmse.iter().filter(|v| v.is_nan()).count()
    }
}

/// Robust regression engine
pub struct RobustRegression {
    method: RobustMethod,
    params: RobustParams,
}

impl RobustRegression {
    pub fn new(method: RobustMethod) -> Self {
        Self {
            method,
            params: RobustParams::default(),
        }
    }

    pub fn with_params(method: RobustMethod, params: RobustParams) -> Self {
        Self { method, params }
    }

    pub fn method(&self) -> RobustMethod {
        self.method
    }

    /// Fit with dimensionality checks on untyped inputs
    pub fn fit_dyn(
        &self,
        x: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
        per_pixel_x: bool,
        null_value: Option<f64>,
    ) -> TmaskResult<RegressionResult> {
        let y_shape = y.shape().to_vec();
        let y = y.into_dimensionality::<Ix3>().map_err(|_| {
            TmaskError::Shape(format!("Y variable has shape {:?}; it should be 3-d", y_shape))
        })?;
        let x = Regressors::from_dyn(x, per_pixel_x)?;
        self.fit(&x, y, null_value)
    }

    /// Fit every pixel of `y` (images x rows x cols) against `x`
    pub fn fit(
        &self,
        x: &Regressors<'_>,
        y: ArrayView3<'_, f64>,
        null_value: Option<f64>,
    ) -> TmaskResult<RegressionResult> {
        let (num_images, rows, cols) = y.dim();
        let num_params = x.num_params();
        self.validate_shapes(x, &y)?;

        log::info!(
            "Robust {:?} fit: {} images, {}x{} pixels, {} parameters",
            self.method,
            num_images,
            rows,
            cols,
            num_params
        );

        let fits = self.fit_rows(x, &y, null_value);

        let mut result = RegressionResult {
            coeffs: Array3::zeros((num_params, rows, cols)),
            adj_rsq: Array2::zeros((rows, cols)),
            num_iter: Array2::zeros((rows, cols)),
            rmse: Array2::zeros((rows, cols)),
        };

        for (row, row_fits) in fits.into_iter().enumerate() {
            for (col, fit) in row_fits.into_iter().enumerate() {
                for (param, c) in fit.coeffs.iter().enumerate() {
                    result.coeffs[[param, row, col]] = *c;
                }
                result.adj_rsq[[row, col]] = fit.adj_rsq;
                result.num_iter[[row, col]] = fit.num_iter;
                result.rmse[[row, col]] = fit.rmse;
            }
        }

        let undefined = result.undefined_pixels();
        if undefined > 0 {
            log::warn!(
                "{} of {} pixels could not be fitted and carry NaN coefficients",
                undefined,
                rows * cols
            );
        }

        Ok(result)
    }

    fn validate_shapes(&self, x: &Regressors<'_>, y: &ArrayView3<'_, f64>) -> TmaskResult<()> {
        let (num_images, rows, cols) = y.dim();

        if x.num_params() == 0 {
            return Err(TmaskError::Shape("X variable has no parameters".to_string()));
        }

        if x.num_images() != num_images {
            return Err(TmaskError::Shape(format!(
                "X variable covers {} images but Y has {}",
                x.num_images(),
                num_images
            )));
        }

        if let Regressors::PerPixel(px) = x {
            let (_, _, x_rows, x_cols) = px.dim();
            if x_rows != rows || x_cols != cols {
                return Err(TmaskError::Shape(format!(
                    "Per-pixel X grid is {}x{} but Y grid is {}x{}",
                    x_rows, x_cols, rows, cols
                )));
            }
        }

        Ok(())
    }

    #[cfg(feature = "parallel")]
    fn fit_rows(
        &self,
        x: &Regressors<'_>,
        y: &ArrayView3<'_, f64>,
        null_value: Option<f64>,
    ) -> Vec<Vec<PixelFit>> {
        use rayon::prelude::*;

        let (_, rows, cols) = y.dim();
        (0..rows)
            .into_par_iter()
            .map(|row| {
                (0..cols)
                    .map(|col| self.fit_stack_pixel(x, y, null_value, row, col))
                    .collect()
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn fit_rows(
        &self,
        x: &Regressors<'_>,
        y: &ArrayView3<'_, f64>,
        null_value: Option<f64>,
    ) -> Vec<Vec<PixelFit>> {
        let (_, rows, cols) = y.dim();
        (0..rows)
            .map(|row| {
                (0..cols)
                    .map(|col| self.fit_stack_pixel(x, y, null_value, row, col))
                    .collect()
            })
            .collect()
    }

    /// Gather the non-null observations of one pixel and fit them
    fn fit_stack_pixel(
        &self,
        x: &Regressors<'_>,
        y: &ArrayView3<'_, f64>,
        null_value: Option<f64>,
        row: usize,
        col: usize,
    ) -> PixelFit {
        let num_params = x.num_params();
        let valid: Vec<usize> = (0..y.dim().0)
            .filter(|&img| {
                let v = y[[img, row, col]];
                v.is_finite() && null_value.map_or(true, |null| v != null)
            })
            .collect();

        if valid.len() < num_params {
            return PixelFit::undefined(num_params);
        }

        let design = Array2::from_shape_fn((valid.len(), num_params), |(i, p)| {
            x.value(p, valid[i], row, col)
        });
        let obs = Array1::from_iter(valid.iter().map(|&img| y[[img, row, col]]));

        self.fit_pixel(&design, &obs)
    }

    /// IRLS fit of one series; `design` is observations x params
    pub fn fit_pixel(&self, design: &Array2<f64>, obs: &Array1<f64>) -> PixelFit {
        let (n, p) = design.dim();
        if n < p || obs.len() != n {
            return PixelFit::undefined(p);
        }

        let unit_weights = Array1::ones(n);
        let (mut coeffs, chol) = match weighted_least_squares(design, obs, &unit_weights) {
            Some(solution) => solution,
            None => return PixelFit::undefined(p),
        };

        let mut num_iter = 0u32;
        if self.method != RobustMethod::Ols {
            let adjust = leverage_adjustment(design, &chol);
            let tune = self.method.tuning_constant();
            let data_scale = obs.iter().fold(1.0f64, |m, v| m.max(v.abs()));

            while (num_iter as usize) < self.params.max_iterations {
                let residuals = obs - &design.dot(&coeffs);
                let adjusted = &residuals * &adjust;
                let sigma = mad_sigma(&adjusted, p);

                // Residuals are at rounding level: the series is already fitted exactly
                if !(sigma > EXACT_FIT_SCALE * data_scale) {
                    break;
                }

                let weights = adjusted.mapv(|r| self.method.weight(r / (tune * sigma)));
                let next = match weighted_least_squares(design, obs, &weights) {
                    Some((next, _)) => next,
                    None => break,
                };
                num_iter += 1;

                let converged = coeffs.iter().zip(next.iter()).all(|(old, new)| {
                    (new - old).abs() <= self.params.tolerance * old.abs().max(new.abs())
                });
                coeffs = next;
                if converged {
                    break;
                }
            }
        }

        let residuals = obs - &design.dot(&coeffs);
        let sse: f64 = residuals.iter().map(|r| r * r).sum();
        let dof = (n - p).max(1) as f64;
        let rmse = (sse / dof).sqrt();

        let mean = obs.sum() / n as f64;
        let sst: f64 = obs.iter().map(|v| (v - mean) * (v - mean)).sum();
        let rsq = if sst > 0.0 {
            1.0 - sse / sst
        } else if sse == 0.0 {
            1.0
        } else {
            0.0
        };
        let adj_rsq = if n > p {
            1.0 - (1.0 - rsq) * (n - 1) as f64 / (n - p) as f64
        } else {
            rsq
        };

        PixelFit {
            coeffs: coeffs.to_vec(),
            adj_rsq,
            num_iter,
            rmse,
        }
    }
}

impl Default for RobustRegression {
    fn default() -> Self {
        Self::new(RobustMethod::Bisquare)
    }
}

/// Solve `(X'WX) c = X'Wy` by Cholesky; returns the coefficients and the factor
fn weighted_least_squares(
    design: &Array2<f64>,
    obs: &Array1<f64>,
    weights: &Array1<f64>,
) -> Option<(Array1<f64>, Array2<f64>)> {
    let (n, p) = design.dim();
    let mut normal = Array2::<f64>::zeros((p, p));
    let mut rhs = Array1::<f64>::zeros(p);

    for i in 0..n {
        let w = weights[i];
        if w == 0.0 {
            continue;
        }
        for a in 0..p {
            let xa = design[[i, a]] * w;
            rhs[a] += xa * obs[i];
            for b in 0..=a {
                normal[[a, b]] += xa * design[[i, b]];
            }
        }
    }

    let chol = cholesky(&normal)?;

    // Forward then backward substitution
    let mut z = Array1::<f64>::zeros(p);
    for i in 0..p {
        let s: f64 = (0..i).map(|k| chol[[i, k]] * z[k]).sum();
        z[i] = (rhs[i] - s) / chol[[i, i]];
    }
    let mut c = Array1::<f64>::zeros(p);
    for i in (0..p).rev() {
        let s: f64 = (i + 1..p).map(|k| chol[[k, i]] * c[k]).sum();
        c[i] = (z[i] - s) / chol[[i, i]];
    }

    Some((c, chol))
}

/// Lower-triangular Cholesky factor of the lower half of `a`
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let p = a.nrows();
    let max_diag = (0..p).map(|i| a[[i, i]].abs()).fold(0.0f64, f64::max);
    if !(max_diag > 0.0) {
        return None;
    }

    let mut l = Array2::<f64>::zeros((p, p));
    for j in 0..p {
        let s: f64 = (0..j).map(|k| l[[j, k]] * l[[j, k]]).sum();
        let d = a[[j, j]] - s;
        if !(d > PIVOT_TOLERANCE * max_diag) {
            return None;
        }
        l[[j, j]] = d.sqrt();
        for i in j + 1..p {
            let s: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            l[[i, j]] = (a[[i, j]] - s) / l[[j, j]];
        }
    }
    Some(l)
}

/// `1 / sqrt(1 - h_i)` for the OLS hat-matrix diagonal `h`
fn leverage_adjustment(design: &Array2<f64>, chol: &Array2<f64>) -> Array1<f64> {
    let (n, p) = design.dim();
    let mut z = vec![0.0; p];
    Array1::from_shape_fn(n, |i| {
        for a in 0..p {
            let s: f64 = (0..a).map(|k| chol[[a, k]] * z[k]).sum();
            z[a] = (design[[i, a]] - s) / chol[[a, a]];
        }
        let h: f64 = z.iter().map(|v| v * v).sum();
        1.0 / (1.0 - h.min(MAX_LEVERAGE)).sqrt()
    })
}

/// MAD-based sigma, ignoring the `p - 1` smallest absolute residuals
fn mad_sigma(residuals: &Array1<f64>, p: usize) -> f64 {
    let mut abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
    abs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let tail = &abs[p.saturating_sub(1).min(abs.len().saturating_sub(1))..];
    let m = tail.len();
    let median = if m % 2 == 1 {
        tail[m / 2]
    } else {
        0.5 * (tail[m / 2 - 1] + tail[m / 2])
    };
    median / MAD_TO_SIGMA
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::design_matrix::build_design_matrix;
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;

    fn monthly_dates(n: usize) -> Vec<f64> {
        (0..n).map(|i| 2_457_388.0 + 30.5 * i as f64).collect()
    }

    fn seasonal_stack(dates: &[f64], rows: usize, cols: usize, coeffs: &[f64]) -> Array3<f64> {
        let (basis, _) = build_design_matrix(dates).unwrap();
        Array3::from_shape_fn((dates.len(), rows, cols), |(t, r, c)| {
            basis.evaluate(dates[t], coeffs) + 10.0 * (r + c) as f64
        })
    }

    #[test]
    fn test_noise_free_series_is_reproduced() {
        let dates = monthly_dates(24);
        let coeffs = [1500.0, -220.0, 140.0, 35.0, -60.0];
        let y = seasonal_stack(&dates, 3, 4, &coeffs);
        let (_, x) = build_design_matrix(&dates).unwrap();

        let engine = RobustRegression::default();
        let result = engine.fit(&Regressors::Shared(x.view()), y.view(), Some(0.0)).unwrap();

        assert_eq!(result.coeffs.dim(), (5, 3, 4));
        for r in 0..3 {
            for c in 0..4 {
                let offset = 10.0 * (r + c) as f64;
                assert_abs_diff_eq!(result.coeffs[[0, r, c]], coeffs[0] + offset, epsilon = 1e-6);
                for p in 1..5 {
                    assert_abs_diff_eq!(result.coeffs[[p, r, c]], coeffs[p], epsilon = 1e-6);
                }
                assert!(result.rmse[[r, c]] < 1e-6);
            }
        }
    }

    #[test]
    fn test_outlier_is_downweighted() {
        let dates = monthly_dates(30);
        let coeffs = [1200.0, 100.0, -80.0, 20.0, 15.0];
        let (basis, x) = build_design_matrix(&dates).unwrap();

        // Small deterministic noise so the MAD is non-zero
        let mut y = Array3::from_shape_fn((dates.len(), 1, 1), |(t, _, _)| {
            basis.evaluate(dates[t], &coeffs) + if t % 2 == 0 { 3.0 } else { -3.0 }
        });
        y[[7, 0, 0]] += 3000.0;

        let robust = RobustRegression::new(RobustMethod::Bisquare)
            .fit(&Regressors::Shared(x.view()), y.view(), None)
            .unwrap();
        let ols = RobustRegression::new(RobustMethod::Ols)
            .fit(&Regressors::Shared(x.view()), y.view(), None)
            .unwrap();

        let robust_err = (robust.coeffs[[0, 0, 0]] - coeffs[0]).abs();
        let ols_err = (ols.coeffs[[0, 0, 0]] - coeffs[0]).abs();
        assert!(robust_err < 10.0, "robust intercept error {}", robust_err);
        assert!(ols_err > robust_err);
        assert!(robust.num_iter[[0, 0]] > 0);
        assert_eq!(ols.num_iter[[0, 0]], 0);
    }

    #[test]
    fn test_null_values_are_excluded_per_pixel() {
        let dates = monthly_dates(20);
        let coeffs = [900.0, 50.0, 40.0, -30.0, 10.0];
        let mut y = seasonal_stack(&dates, 1, 2, &coeffs);
        let (_, x) = build_design_matrix(&dates).unwrap();

        // Pixel (0, 1) loses a few observations to the null value
        for t in [2, 5, 11] {
            y[[t, 0, 1]] = 0.0;
        }

        let result = RobustRegression::default()
            .fit(&Regressors::Shared(x.view()), y.view(), Some(0.0))
            .unwrap();
        assert_abs_diff_eq!(result.coeffs[[1, 0, 1]], coeffs[1], epsilon = 1e-6);
        assert_abs_diff_eq!(result.coeffs[[1, 0, 0]], coeffs[1], epsilon = 1e-6);
    }

    #[test]
    fn test_insufficient_observations_yield_sentinel() {
        let dates = monthly_dates(12);
        let coeffs = [1000.0, 10.0, 20.0, 30.0, 40.0];
        let mut y = seasonal_stack(&dates, 1, 2, &coeffs);
        let (_, x) = build_design_matrix(&dates).unwrap();

        // Leave only 4 valid observations at pixel (0, 0)
        for t in 4..12 {
            y[[t, 0, 0]] = 0.0;
        }

        let result = RobustRegression::default()
            .fit(&Regressors::Shared(x.view()), y.view(), Some(0.0))
            .unwrap();

        assert!(result.coeffs[[0, 0, 0]].is_nan());
        assert!(result.rmse[[0, 0]].is_nan());
        assert_eq!(result.num_iter[[0, 0]], 0);
        assert_eq!(result.undefined_pixels(), 1);

        // Neighbour is unaffected
        assert!(result.rmse[[0, 1]] < 1e-6);
        assert_abs_diff_eq!(result.coeffs[[0, 0, 1]], coeffs[0] + 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_shape_validation() {
        let engine = RobustRegression::default();
        let x = Array2::<f64>::zeros((5, 10));
        let y_bad = Array2::<f64>::zeros((10, 3));
        let result = engine.fit_dyn(x.view().into_dyn(), y_bad.view().into_dyn(), false, None);
        assert!(matches!(result, Err(TmaskError::Shape(_))));

        let y = Array3::<f64>::zeros((10, 2, 2));
        let result = engine.fit_dyn(x.view().into_dyn(), y.view().into_dyn(), true, None);
        assert!(matches!(result, Err(TmaskError::Shape(_))));

        let y_short = Array3::<f64>::zeros((9, 2, 2));
        let result = engine.fit(&Regressors::Shared(x.view()), y_short.view(), None);
        assert!(matches!(result, Err(TmaskError::Shape(_))));
    }

    #[test]
    fn test_per_pixel_regressors_match_shared() {
        let dates = monthly_dates(16);
        let coeffs = [700.0, -40.0, 25.0, 12.0, -8.0];
        let y = seasonal_stack(&dates, 2, 2, &coeffs);
        let (_, x) = build_design_matrix(&dates).unwrap();
        let x4 = ndarray::Array4::from_shape_fn((5, dates.len(), 2, 2), |(p, t, _, _)| x[[p, t]]);

        let engine = RobustRegression::default();
        let shared = engine.fit(&Regressors::Shared(x.view()), y.view(), None).unwrap();
        let per_pixel = engine.fit(&Regressors::PerPixel(x4.view()), y.view(), None).unwrap();

        assert_eq!(shared.coeffs, per_pixel.coeffs);
        assert_eq!(shared.rmse, per_pixel.rmse);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let dates = monthly_dates(18);
        let (basis, x) = build_design_matrix(&dates).unwrap();
        let y = Array3::from_shape_fn((dates.len(), 4, 4), |(t, r, c)| {
            basis.evaluate(dates[t], &[1000.0, 50.0, -50.0, 10.0, 5.0])
                + ((t * 7 + r * 3 + c) % 11) as f64
        });

        let engine = RobustRegression::default();
        let a = engine.fit(&Regressors::Shared(x.view()), y.view(), None).unwrap();
        let b = engine.fit(&Regressors::Shared(x.view()), y.view(), None).unwrap();
        assert_eq!(a.coeffs, b.coeffs);
        assert_eq!(a.num_iter, b.num_iter);
    }

    #[test]
    fn test_method_parsing_and_weights() {
        assert_eq!("tukey".parse::<RobustMethod>().unwrap(), RobustMethod::Bisquare);
        assert_eq!("Huber".parse::<RobustMethod>().unwrap(), RobustMethod::Huber);
        assert!("median".parse::<RobustMethod>().is_err());

        assert_eq!(RobustMethod::Bisquare.weight(0.0), 1.0);
        assert_eq!(RobustMethod::Bisquare.weight(1.5), 0.0);
        assert_eq!(RobustMethod::Huber.weight(2.0), 0.5);
        assert_abs_diff_eq!(RobustMethod::Cauchy.weight(1.0), 0.5);
    }
}
