//! Corner-pixel model curves for visual inspection of the fit.
//!
//! For each persisted corner pixel the fitted harmonic is evaluated on a
//! daily grid spanning the training dates and exported with the observed
//! reflectances. Plotting itself is left to external tools.

use crate::config::{create_or_clean_dir, TmaskConfig};
use crate::core::model::ModelEvaluator;
use crate::io::acquisition::date_from_julian_day;
use crate::io::coefficient_store::{CoefficientStore, Corner, CornerSeries};
use crate::types::{Band, Reflectance, TmaskError, TmaskResult, NUM_BANDS};
use ndarray::{Array1, Array2};
use std::path::{Path, PathBuf};

/// Fitted curve and observations of one corner pixel
#[derive(Debug, Clone)]
pub struct CornerCurve {
    pub corner: Corner,
    /// Daily grid (ordinal days)
    pub days: Array1<f64>,
    /// Model values (bands x days)
    pub fitted: Array2<f64>,
    /// Training dates
    pub observed_dates: Array1<f64>,
    /// Observed reflectance (dates x bands)
    pub observed: Array2<Reflectance>,
}

impl CornerCurve {
    /// Evaluate a stored corner series on the daily grid of `evaluator`
    pub fn from_series(
        evaluator: &ModelEvaluator,
        series: CornerSeries,
        observed_dates: Array1<f64>,
    ) -> TmaskResult<Self> {
        if series.coeffs.nrows() != NUM_BANDS || series.observed.ncols() != NUM_BANDS {
            return Err(TmaskError::Shape(format!(
                "Corner {} has {} coefficient bands and {} observed bands, expected {}",
                series.corner,
                series.coeffs.nrows(),
                series.observed.ncols(),
                NUM_BANDS
            )));
        }
        if series.observed.nrows() != observed_dates.len() {
            return Err(TmaskError::Shape(format!(
                "Corner {} has {} observations for {} dates",
                series.corner,
                series.observed.nrows(),
                observed_dates.len()
            )));
        }

        let days = evaluator.basis().daily_grid();
        let fitted = evaluator.predict_pixel(&days, series.coeffs.view());
        Ok(Self {
            corner: series.corner,
            days,
            fitted,
            observed_dates,
            observed: series.observed,
        })
    }

    /// Long-format CSV: one `model` row per grid day, one `observed` row per date
    pub fn to_csv(&self) -> String {
        let mut out = String::from("kind,julian_day,date");
        for band in Band::ALL {
            out.push_str(&format!(",{}", band.to_string().to_lowercase()));
        }
        out.push('\n');

        for (t, &day) in self.days.iter().enumerate() {
            out.push_str(&format!("model,{},{}", day, calendar(day)));
            for b in 0..NUM_BANDS {
                out.push_str(&format!(",{:.3}", self.fitted[[b, t]]));
            }
            out.push('\n');
        }

        for (t, &day) in self.observed_dates.iter().enumerate() {
            out.push_str(&format!("observed,{},{}", day, calendar(day)));
            for b in 0..NUM_BANDS {
                out.push_str(&format!(",{}", self.observed[[t, b]]));
            }
            out.push('\n');
        }
        out
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> TmaskResult<()> {
        std::fs::write(path.as_ref(), self.to_csv())?;
        log::info!("Wrote {} curve to {}", self.corner, path.as_ref().display());
        Ok(())
    }
}

fn calendar(day: f64) -> String {
    date_from_julian_day(day)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Curves for all four corners of a persisted fit
pub fn corner_curves(store: &CoefficientStore) -> TmaskResult<Vec<CornerCurve>> {
    let dates = store.load_dates()?;
    let evaluator = ModelEvaluator::from_training_dates(&dates.to_vec())?;

    Corner::ALL
        .iter()
        .map(|&corner| CornerCurve::from_series(&evaluator, store.load_corner(corner)?, dates.clone()))
        .collect()
}

/// Export `tmask_<corner>.csv` for every corner into the plots directory
pub fn run_diagnostics(config: &TmaskConfig) -> TmaskResult<Vec<PathBuf>> {
    let store = CoefficientStore::new(&config.paths.coefficients_dir);
    let curves = corner_curves(&store)?;

    create_or_clean_dir(&config.paths.plots_dir)?;
    curves
        .iter()
        .map(|curve| {
            let path = config
                .paths
                .plots_dir
                .join(format!("tmask_{}.csv", curve.corner.tag()));
            curve.write_csv(&path)?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::design_matrix::HarmonicBasis;
    use approx::assert_abs_diff_eq;

    fn flat_series(level: f32) -> CornerSeries {
        let mut coeffs = Array2::zeros((NUM_BANDS, 5));
        coeffs.column_mut(0).fill(level);
        CornerSeries {
            corner: Corner::UpperLeft,
            coeffs,
            observed: Array2::from_elem((3, NUM_BANDS), level as Reflectance),
        }
    }

    #[test]
    fn test_daily_grid_covers_training_range() {
        // 2016-01-01 .. 2016-01-11
        let dates = Array1::from(vec![2_457_389.0, 2_457_394.0, 2_457_399.0]);
        let evaluator = ModelEvaluator::new(HarmonicBasis::from_dates(&dates.to_vec()).unwrap());
        let curve = CornerCurve::from_series(&evaluator, flat_series(800.0), dates).unwrap();

        assert_eq!(curve.days.len(), 11);
        assert_eq!(curve.fitted.dim(), (NUM_BANDS, 11));
        assert_abs_diff_eq!(curve.fitted[[2, 7]], 800.0, epsilon = 1e-9);
    }

    #[test]
    fn test_csv_layout() {
        let dates = Array1::from(vec![2_457_389.0, 2_457_390.0, 2_457_391.0]);
        let evaluator = ModelEvaluator::new(HarmonicBasis::from_dates(&dates.to_vec()).unwrap());
        let csv = CornerCurve::from_series(&evaluator, flat_series(500.0), dates)
            .unwrap()
            .to_csv();

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "kind,julian_day,date,blue,green,red,nir");
        assert_eq!(lines[1], "model,2457389,2016-01-01,500.000,500.000,500.000,500.000");
        assert_eq!(lines.len(), 1 + 3 + 3);
        assert_eq!(lines[4], "observed,2457389,2016-01-01,500,500,500,500");
    }

    #[test]
    fn test_mismatched_observations_are_rejected() {
        let dates = Array1::from(vec![2_457_389.0, 2_457_399.0]);
        let evaluator = ModelEvaluator::new(HarmonicBasis::from_dates(&dates.to_vec()).unwrap());
        let result = CornerCurve::from_series(&evaluator, flat_series(1.0), dates);
        assert!(matches!(result, Err(TmaskError::Shape(_))));
    }
}
