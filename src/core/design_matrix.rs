use crate::types::{TmaskError, TmaskResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Length of the annual harmonic, in days
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Number of harmonic regressors (constant, annual cos/sin, series cos/sin)
pub const NUM_PARAMS: usize = 5;

/// Harmonic basis shared by fitting, prediction and diagnostics
///
/// The intra-series period is the span of the training dates and stays fixed
/// once the basis is built, so evaluating outside the training range uses the
/// same periods as the fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicBasis {
    /// First training date (ordinal day)
    pub first_date: f64,
    /// Last training date minus first training date
    pub span_days: f64,
}

impl HarmonicBasis {
    /// Build the basis from ascending acquisition dates
    pub fn from_dates(dates: &[f64]) -> TmaskResult<Self> {
        if dates.len() < 2 {
            return Err(TmaskError::Configuration(format!(
                "At least 2 acquisition dates are required, got {}",
                dates.len()
            )));
        }

        if let Some(bad) = dates.iter().find(|d| !d.is_finite()) {
            return Err(TmaskError::Configuration(format!(
                "Acquisition date {} is not finite",
                bad
            )));
        }

        let first_date = dates[0];
        let span_days = dates[dates.len() - 1] - first_date;
        if span_days == 0.0 {
            return Err(TmaskError::Configuration(
                "Acquisition dates span zero days; the series harmonic is undefined".to_string(),
            ));
        }

        if span_days < 0.0 {
            log::warn!(
                "Acquisition dates are not ascending (first {}, last {})",
                first_date,
                dates[dates.len() - 1]
            );
        }

        Ok(Self {
            first_date,
            span_days,
        })
    }

    /// Regressor values for a single date
    pub fn regressors(&self, date: f64) -> [f64; NUM_PARAMS] {
        let annual = 2.0 * PI * date / DAYS_PER_YEAR;
        let series = 2.0 * PI * date / self.span_days;
        [1.0, annual.cos(), annual.sin(), series.cos(), series.sin()]
    }

    /// Evaluate the model `coeffs` at `date`
    pub fn evaluate(&self, date: f64, coeffs: &[f64]) -> f64 {
        self.regressors(date)
            .iter()
            .zip(coeffs)
            .map(|(x, c)| x * c)
            .sum()
    }

    /// Design matrix (params x dates)
    pub fn design_matrix(&self, dates: &[f64]) -> Array2<f64> {
        let mut x = Array2::zeros((NUM_PARAMS, dates.len()));
        for (j, &date) in dates.iter().enumerate() {
            for (i, value) in self.regressors(date).iter().enumerate() {
                x[[i, j]] = *value;
            }
        }
        x
    }

    /// Daily grid from the first to the last training date
    pub fn daily_grid(&self) -> Array1<f64> {
        let days = self.span_days.abs().floor() as usize;
        Array1::from_shape_fn(days + 1, |i| self.first_date + i as f64)
    }
}

/// Design matrix builder entry point
pub fn build_design_matrix(dates: &[f64]) -> TmaskResult<(HarmonicBasis, Array2<f64>)> {
    let basis = HarmonicBasis::from_dates(dates)?;
    log::debug!(
        "Harmonic basis: {} dates, span {} days",
        dates.len(),
        basis.span_days
    );
    Ok((basis, basis.design_matrix(dates)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_design_matrix_shape_and_rows() {
        let dates = [0.0, 91.25, 182.5, 365.0];
        let (basis, x) = build_design_matrix(&dates).unwrap();

        assert_eq!(x.dim(), (NUM_PARAMS, 4));
        assert_abs_diff_eq!(basis.span_days, 365.0);

        // Constant row
        assert!(x.row(0).iter().all(|&v| v == 1.0));
        // Quarter year: annual cos ~ 0, sin ~ 1
        assert_abs_diff_eq!(x[[1, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[[2, 1]], 1.0, epsilon = 1e-12);
        // Span equals one year here, so both harmonics coincide
        assert_abs_diff_eq!(x[[3, 2]], x[[1, 2]], epsilon = 1e-12);
    }

    #[test]
    fn test_single_date_is_rejected() {
        let result = HarmonicBasis::from_dates(&[2_457_000.0]);
        assert!(matches!(result, Err(TmaskError::Configuration(_))));
    }

    #[test]
    fn test_zero_span_is_rejected() {
        let result = HarmonicBasis::from_dates(&[2_457_000.0, 2_457_000.0, 2_457_000.0]);
        assert!(matches!(result, Err(TmaskError::Configuration(_))));
    }

    #[test]
    fn test_evaluate_matches_design_matrix() {
        let dates = [2_457_388.0, 2_457_450.0, 2_457_600.0, 2_457_800.0];
        let (basis, x) = build_design_matrix(&dates).unwrap();
        let coeffs = [1200.0, -150.0, 80.0, 25.0, -10.0];

        for (j, &date) in dates.iter().enumerate() {
            let expected: f64 = (0..NUM_PARAMS).map(|i| x[[i, j]] * coeffs[i]).sum();
            assert_abs_diff_eq!(basis.evaluate(date, &coeffs), expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_daily_grid_covers_span() {
        let basis = HarmonicBasis::from_dates(&[100.0, 110.0]).unwrap();
        let grid = basis.daily_grid();
        assert_eq!(grid.len(), 11);
        assert_eq!(grid[0], 100.0);
        assert_eq!(grid[10], 110.0);
    }
}
