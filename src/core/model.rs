use crate::core::design_matrix::{HarmonicBasis, NUM_PARAMS};
use crate::types::{CoefficientStack, PredictionStack, TmaskError, TmaskResult};
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;

/// Evaluates stored harmonic coefficients at arbitrary dates
pub struct ModelEvaluator {
    basis: HarmonicBasis,
}

impl ModelEvaluator {
    pub fn new(basis: HarmonicBasis) -> Self {
        Self { basis }
    }

    /// Rebuild the training basis from the persisted training dates
    pub fn from_training_dates(dates: &[f64]) -> TmaskResult<Self> {
        Ok(Self::new(HarmonicBasis::from_dates(dates)?))
    }

    pub fn basis(&self) -> &HarmonicBasis {
        &self.basis
    }

    /// Predicted reflectance (dates x bands x rows x cols) for `coeffs`
    /// laid out as (bands x params x rows x cols)
    pub fn predict(&self, dates: &[f64], coeffs: &CoefficientStack) -> TmaskResult<PredictionStack> {
        let (bands, params, rows, cols) = coeffs.dim();
        if params != NUM_PARAMS {
            return Err(TmaskError::Shape(format!(
                "Coefficient stack has {} parameters, expected {}",
                params, NUM_PARAMS
            )));
        }

        log::info!(
            "Predicting {} dates for {} bands over {}x{} pixels",
            dates.len(),
            bands,
            rows,
            cols
        );

        let mut predicted = PredictionStack::zeros((dates.len(), bands, rows, cols));

        #[cfg(feature = "parallel")]
        let iter = {
            use rayon::prelude::*;
            predicted
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .zip(dates.par_iter())
        };
        #[cfg(not(feature = "parallel"))]
        let iter = predicted.axis_iter_mut(Axis(0)).zip(dates.iter());

        iter.for_each(|(mut slice, &date)| {
            let x = self.basis.regressors(date);
            for band in 0..bands {
                let band_coeffs = coeffs.index_axis(Axis(0), band);
                let mut out = slice.index_axis_mut(Axis(0), band);
                Zip::from(&mut out)
                    .and(band_coeffs.lanes(Axis(0)))
                    .for_each(|o, lane| {
                        let value: f64 = x.iter().zip(lane.iter()).map(|(xp, &c)| xp * c as f64).sum();
                        *o = value as f32;
                    });
            }
        });

        Ok(predicted)
    }

    /// Evaluate one pixel's (bands x params) coefficients over `dates`,
    /// returning (bands x dates)
    pub fn predict_pixel(&self, dates: &Array1<f64>, coeffs: ArrayView2<'_, f32>) -> Array2<f64> {
        let bands = coeffs.nrows();
        Array2::from_shape_fn((bands, dates.len()), |(b, t)| {
            let row: Vec<f64> = coeffs.row(b).iter().map(|&c| c as f64).collect();
            self.basis.evaluate(dates[t], &row)
        })
    }
}
