//! Fit and classification passes over a whole acquisition series.
//!
//! The fit pass reads the listed images, fits one harmonic model per pixel and
//! band, and persists the model arrays. The classification pass reloads them,
//! predicts every date and writes prediction and mask rasters.

use crate::config::{create_or_clean_dir, TmaskConfig};
use crate::core::cloud_mask::{CloudClassifier, ThresholdPolicy, CLOUD_VALUE, SHADOW_VALUE};
use crate::core::design_matrix::build_design_matrix;
use crate::core::model::ModelEvaluator;
use crate::core::robust_regression::{Regressors, RobustMethod, RobustRegression};
use crate::io::acquisition::{read_acquisitions, read_image_list};
use crate::io::coefficient_store::{CoefficientStore, ModelArrays};
use crate::io::manifest::RunManifest;
use crate::io::raster_writer::{derived_path, GeoTiffWriter, CLOUD_SUFFIX, PREDICTION_SUFFIX};
use crate::io::stack_reader::StackReader;
use crate::types::{RasterGeometry, TmaskError, TmaskResult, NUM_BANDS};
use ndarray::{Array1, Array3, Array4, ArrayView2, Axis};
use num_traits::AsPrimitive;
use std::path::PathBuf;
use std::time::Instant;

/// Outcome of a fit pass
#[derive(Debug, Clone)]
pub struct FitSummary {
    pub num_dates: usize,
    pub width: usize,
    pub height: usize,
    /// Pixels per band left with the NaN sentinel
    pub undefined_pixels: Vec<usize>,
}

/// Per-image outcome of a classification pass
#[derive(Debug, Clone)]
pub struct SceneReport {
    pub image: PathBuf,
    pub prediction: PathBuf,
    /// Written only when the scene has at least one flagged pixel
    pub mask: Option<PathBuf>,
    pub cloud_pixels: usize,
    pub shadow_pixels: usize,
}

/// Fit the harmonic model to every band of `stack` (time x band x row x col)
pub fn fit_model<T>(
    stack: &Array4<T>,
    design: ArrayView2<'_, f64>,
    dates: &[f64],
    method: RobustMethod,
    null_value: Option<f64>,
) -> TmaskResult<ModelArrays>
where
    T: AsPrimitive<f64>,
{
    let (num_dates, bands, rows, cols) = stack.dim();
    if num_dates != dates.len() {
        return Err(TmaskError::Shape(format!(
            "Stack has {} dates but {} dates were supplied",
            num_dates,
            dates.len()
        )));
    }

    let engine = RobustRegression::new(method);
    let regressors = Regressors::Shared(design);
    let num_params = regressors.num_params();

    let mut model = ModelArrays {
        coeffs: Array4::zeros((bands, num_params, rows, cols)),
        rmse: Array3::zeros((bands, rows, cols)),
        num_iter: Array3::zeros((bands, rows, cols)),
        adj_rsq: Array3::zeros((bands, rows, cols)),
        dates: Array1::from(dates.to_vec()),
    };

    for band in 0..bands {
        let start = Instant::now();
        let y = stack
            .index_axis(Axis(1), band)
            .mapv(|v| AsPrimitive::<f64>::as_(v));
        let result = engine.fit(&regressors, y.view(), null_value)?;

        model
            .coeffs
            .index_axis_mut(Axis(0), band)
            .assign(&result.coeffs.mapv(|v| v as f32));
        model
            .rmse
            .index_axis_mut(Axis(0), band)
            .assign(&result.rmse.mapv(|v| v as f32));
        model
            .adj_rsq
            .index_axis_mut(Axis(0), band)
            .assign(&result.adj_rsq.mapv(|v| v as f32));
        model.num_iter.index_axis_mut(Axis(0), band).assign(&result.num_iter);

        log::info!("Band {} fitted in {:.2?}", band + 1, start.elapsed());
    }

    Ok(model)
}

/// Pixels per band whose RMSE is the NaN sentinel
fn undefined_per_band(rmse: &Array3<f32>) -> Vec<usize> {
    rmse.axis_iter(Axis(0))
        .map(|band| band.iter().filter(|v| v.is_nan()).count())
        .collect()
}

/// Read the series, fit it and persist the model arrays
pub fn run_fit(config: &TmaskConfig) -> TmaskResult<FitSummary> {
    let paths = &config.paths;
    let acquisitions = read_acquisitions(&paths.analytic_list, &paths.date_list)?;
    let dates: Vec<f64> = acquisitions.iter().map(|a| a.date).collect();

    // Date problems surface before any raster is read
    let (basis, design) = build_design_matrix(&dates)?;

    let stack = StackReader::new(config.use_quality_mask).assemble(&acquisitions)?;
    let model = fit_model(
        stack.training_stack(),
        design.view(),
        &dates,
        config.method,
        config.null_value,
    )?;

    // Earlier model arrays survive any failure above
    create_or_clean_dir(&paths.coefficients_dir)?;
    let store = CoefficientStore::new(&paths.coefficients_dir);
    store.save_model(&model)?;
    store.save_stack(&stack.observed)?;

    let undefined_pixels = undefined_per_band(&model.rmse);
    RunManifest::new(
        config.clone(),
        stack.geometry.clone(),
        basis,
        acquisitions.iter().map(|a| a.image.clone()).collect(),
        undefined_pixels.clone(),
    )
    .save(store.dir())?;

    Ok(FitSummary {
        num_dates: dates.len(),
        width: stack.geometry.width,
        height: stack.geometry.height,
        undefined_pixels,
    })
}

/// Output grid: the fit manifest if present, otherwise the first image
fn output_geometry(store: &CoefficientStore, images: &[PathBuf]) -> TmaskResult<RasterGeometry> {
    if let Some(manifest) = RunManifest::load(store.dir())? {
        return Ok(manifest.geometry);
    }
    let first = images
        .first()
        .ok_or_else(|| TmaskError::Configuration("Image list is empty".to_string()))?;
    log::debug!("No fit manifest; taking georeferencing from {}", first.display());
    StackReader::read_geometry(first)
}

/// Predict every listed date, classify it and write the output rasters
pub fn run_classification(config: &TmaskConfig) -> TmaskResult<Vec<SceneReport>> {
    let paths = &config.paths;
    let images = read_image_list(&paths.analytic_list)?;
    let store = CoefficientStore::new(&paths.coefficients_dir);

    let model = store.load_model()?;
    let observed = store.load_stack()?;
    let dates = model.dates.to_vec();

    if observed.dim().0 != dates.len() || images.len() != dates.len() {
        return Err(TmaskError::Configuration(format!(
            "{} listed images, {} stored scenes and {} stored dates disagree",
            images.len(),
            observed.dim().0,
            dates.len()
        )));
    }
    if observed.dim().1 != NUM_BANDS {
        return Err(TmaskError::Shape(format!(
            "Stored stack has {} bands, expected {}",
            observed.dim().1,
            NUM_BANDS
        )));
    }

    let evaluator = ModelEvaluator::from_training_dates(&dates)?;
    let predicted = evaluator.predict(&dates, &model.coeffs)?;

    let writer = GeoTiffWriter::new(output_geometry(&store, &images)?);
    create_or_clean_dir(&paths.results_dir)?;

    for (image, scene) in images.iter().zip(predicted.axis_iter(Axis(0))) {
        writer.write_prediction(scene, derived_path(&paths.results_dir, image, PREDICTION_SUFFIX))?;
    }

    let policy = ThresholdPolicy::from_mode(
        config.threshold_mode,
        config.scaled_static_threshold(),
        Some(model.rmse),
    )?;
    let masks = CloudClassifier::new(policy).classify_stack(&observed, &predicted)?;

    let mut reports = Vec::with_capacity(images.len());
    for (image, mask) in images.iter().zip(masks) {
        let mask_path = if mask.has_detections() {
            let path = derived_path(&paths.results_dir, image, CLOUD_SUFFIX);
            writer.write_mask(mask.encoded.view(), &path)?;
            Some(path)
        } else {
            None
        };

        reports.push(SceneReport {
            image: image.clone(),
            prediction: derived_path(&paths.results_dir, image, PREDICTION_SUFFIX),
            mask: mask_path,
            cloud_pixels: mask.count(CLOUD_VALUE) + mask.count(CLOUD_VALUE | SHADOW_VALUE),
            shadow_pixels: mask.count(SHADOW_VALUE) + mask.count(CLOUD_VALUE | SHADOW_VALUE),
        });
    }

    let flagged = reports.iter().filter(|r| r.mask.is_some()).count();
    log::info!("{} of {} scenes carry cloud or shadow", flagged, reports.len());
    Ok(reports)
}
