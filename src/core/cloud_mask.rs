//! Cloud and cloud-shadow classification from model residuals.
//!
//! For every scene the observed reflectance is compared with the model
//! prediction band by band. Exceedance maps are combined into a cloud layer
//! and a shadow layer according to the run's [`ThresholdMode`], each layer is
//! median filtered, and the two are packed into one byte per pixel:
//! `2 * cloud + shadow`.

use crate::core::median_filter::MedianFilter;
use crate::types::{
    Band, BandStatistic, MaskImage, PredictionStack, Reflectance, ReflectanceStack, ThresholdMode,
    TmaskError, TmaskResult, NUM_BANDS,
};
use ndarray::{Array2, ArrayView3, Axis, Zip};

/// Value written for shadow pixels
pub const SHADOW_VALUE: u8 = 1;
/// Value written for cloud pixels
pub const CLOUD_VALUE: u8 = 2;

/// Residual thresholds applied to every scene of a run
#[derive(Debug, Clone)]
pub enum ThresholdPolicy {
    /// One threshold (scaled units) for every band and pixel
    Static { threshold: f32 },
    /// Per-band, per-pixel thresholds (band x row x col), taken from the fit RMSE
    Dynamic { rmse: BandStatistic },
}

impl ThresholdPolicy {
    /// Select the policy for `mode`; dynamic thresholds need the fit RMSE
    pub fn from_mode(
        mode: ThresholdMode,
        static_threshold: f32,
        rmse: Option<BandStatistic>,
    ) -> TmaskResult<Self> {
        match mode {
            ThresholdMode::Static => Ok(ThresholdPolicy::Static {
                threshold: static_threshold,
            }),
            ThresholdMode::Dynamic => {
                let rmse = rmse.ok_or_else(|| {
                    TmaskError::Configuration(
                        "Dynamic thresholds require the RMSE of the fit".to_string(),
                    )
                })?;
                if rmse.dim().0 != NUM_BANDS {
                    return Err(TmaskError::Shape(format!(
                        "RMSE stack has {} bands, expected {}",
                        rmse.dim().0,
                        NUM_BANDS
                    )));
                }
                Ok(ThresholdPolicy::Dynamic { rmse })
            }
        }
    }

    pub fn mode(&self) -> ThresholdMode {
        match self {
            ThresholdPolicy::Static { .. } => ThresholdMode::Static,
            ThresholdPolicy::Dynamic { .. } => ThresholdMode::Dynamic,
        }
    }

    fn check_grid(&self, rows: usize, cols: usize) -> TmaskResult<()> {
        if let ThresholdPolicy::Dynamic { rmse } = self {
            let (_, r, c) = rmse.dim();
            if (r, c) != (rows, cols) {
                return Err(TmaskError::Shape(format!(
                    "RMSE grid is {}x{} but the scene grid is {}x{}",
                    r, c, rows, cols
                )));
            }
        }
        Ok(())
    }
}

/// Per-band boolean exceedance maps for one scene
#[derive(Debug, Clone)]
pub struct BandExceedance {
    /// residual > threshold
    pub above: Vec<Array2<bool>>,
    /// residual < -threshold
    pub below: Vec<Array2<bool>>,
}

impl BandExceedance {
    /// Compare `actual` with `predicted` (both band x row x col)
    pub fn compute(
        actual: ArrayView3<'_, Reflectance>,
        predicted: ArrayView3<'_, f32>,
        policy: &ThresholdPolicy,
    ) -> Self {
        let (bands, rows, cols) = actual.dim();
        let mut above = Vec::with_capacity(bands);
        let mut below = Vec::with_capacity(bands);

        for band in 0..bands {
            let act = actual.index_axis(Axis(0), band);
            let pred = predicted.index_axis(Axis(0), band);
            let mut up = Array2::from_elem((rows, cols), false);
            let mut down = Array2::from_elem((rows, cols), false);

            match policy {
                ThresholdPolicy::Static { threshold } => {
                    let t = *threshold;
                    Zip::from(&mut up)
                        .and(&mut down)
                        .and(&act)
                        .and(&pred)
                        .for_each(|u, d, &a, &p| {
                            let residual = a as f32 - p;
                            *u = residual > t;
                            *d = residual < -t;
                        });
                }
                ThresholdPolicy::Dynamic { rmse } => {
                    let thresholds = rmse.index_axis(Axis(0), band);
                    Zip::from(&mut up)
                        .and(&mut down)
                        .and(&act)
                        .and(&pred)
                        .and(&thresholds)
                        .for_each(|u, d, &a, &p, &t| {
                            let residual = a as f32 - p;
                            *u = residual > t;
                            *d = residual < -t;
                        });
                }
            }

            above.push(up);
            below.push(down);
        }

        Self { above, below }
    }

    /// Combine band maps into (cloud, shadow) layers
    pub fn combine(&self, mode: ThresholdMode) -> (Array2<bool>, Array2<bool>) {
        match mode {
            ThresholdMode::Dynamic => (all_bands(&self.above), all_bands(&self.below)),
            ThresholdMode::Static => {
                // No shortwave-infrared band, so the cloud/snow test is skipped
                let cloud = self.above[Band::Green.index()].clone();
                let mut shadow = self.below[Band::Nir.index()].clone();
                Zip::from(&mut shadow).and(&cloud).for_each(|s, &c| *s = *s && !c);
                (cloud, shadow)
            }
        }
    }
}

fn all_bands(maps: &[Array2<bool>]) -> Array2<bool> {
    let mut combined = maps[0].clone();
    for map in &maps[1..] {
        Zip::from(&mut combined).and(map).for_each(|acc, &v| *acc = *acc && v);
    }
    combined
}

/// Classification outcome for one scene
#[derive(Debug, Clone)]
pub struct SceneMask {
    /// Cloud layer before denoising
    pub cloud: Array2<bool>,
    /// Shadow layer before denoising
    pub shadow: Array2<bool>,
    /// Denoised, encoded mask (0 clear, 1 shadow, 2 cloud, 3 both)
    pub encoded: MaskImage,
}

impl SceneMask {
    pub fn has_detections(&self) -> bool {
        self.encoded.iter().any(|&v| v != 0)
    }

    pub fn count(&self, value: u8) -> usize {
        self.encoded.iter().filter(|&&v| v == value).count()
    }
}

/// Pack filtered layers into `2 * cloud + shadow`
pub fn encode_mask(cloud: &Array2<u8>, shadow: &Array2<u8>) -> MaskImage {
    let mut encoded = MaskImage::zeros(cloud.dim());
    Zip::from(&mut encoded)
        .and(cloud)
        .and(shadow)
        .for_each(|e, &c, &s| *e = CLOUD_VALUE * c + SHADOW_VALUE * s);
    encoded
}

/// Threshold-based cloud and shadow classifier
pub struct CloudClassifier {
    policy: ThresholdPolicy,
    filter: MedianFilter,
}

impl CloudClassifier {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Self {
            policy,
            filter: MedianFilter::new(),
        }
    }

    /// Classify one scene; `actual` and `predicted` are band x row x col
    pub fn classify_scene(
        &self,
        actual: ArrayView3<'_, Reflectance>,
        predicted: ArrayView3<'_, f32>,
    ) -> TmaskResult<SceneMask> {
        let (bands, rows, cols) = actual.dim();
        if predicted.dim() != actual.dim() {
            return Err(TmaskError::Shape(format!(
                "Prediction shape {:?} does not match observation shape {:?}",
                predicted.dim(),
                actual.dim()
            )));
        }
        if bands != NUM_BANDS {
            return Err(TmaskError::Shape(format!(
                "Scene has {} bands, expected {}",
                bands, NUM_BANDS
            )));
        }
        self.policy.check_grid(rows, cols)?;

        let exceedance = BandExceedance::compute(actual, predicted, &self.policy);
        let (cloud, shadow) = exceedance.combine(self.policy.mode());

        let cloud_filtered = self.filter.apply(&cloud.mapv(u8::from));
        let shadow_filtered = self.filter.apply(&shadow.mapv(u8::from));
        let encoded = encode_mask(&cloud_filtered, &shadow_filtered);

        Ok(SceneMask {
            cloud,
            shadow,
            encoded,
        })
    }

    /// Classify every scene of a stack (time x band x row x col)
    pub fn classify_stack(
        &self,
        actual: &ReflectanceStack,
        predicted: &PredictionStack,
    ) -> TmaskResult<Vec<SceneMask>> {
        if actual.dim() != predicted.dim() {
            return Err(TmaskError::Shape(format!(
                "Prediction stack {:?} does not match observation stack {:?}",
                predicted.dim(),
                actual.dim()
            )));
        }

        log::info!(
            "Classifying {} scenes with {} thresholds",
            actual.dim().0,
            self.policy.mode()
        );

        #[cfg(feature = "parallel")]
        let masks = {
            use rayon::prelude::*;
            (0..actual.dim().0)
                .into_par_iter()
                .map(|i| {
                    self.classify_scene(
                        actual.index_axis(Axis(0), i),
                        predicted.index_axis(Axis(0), i),
                    )
                })
                .collect::<TmaskResult<Vec<_>>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let masks = (0..actual.dim().0)
            .map(|i| {
                self.classify_scene(
                    actual.index_axis(Axis(0), i),
                    predicted.index_axis(Axis(0), i),
                )
            })
            .collect::<TmaskResult<Vec<_>>>()?;

        for (i, mask) in masks.iter().enumerate() {
            log::debug!(
                "Scene {}: {} cloud, {} shadow, {} both",
                i,
                mask.count(CLOUD_VALUE),
                mask.count(SHADOW_VALUE),
                mask.count(CLOUD_VALUE + SHADOW_VALUE)
            );
        }

        Ok(masks)
    }
}
