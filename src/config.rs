//! Run configuration: resolved paths plus the per-run switches.
//!
//! Nothing here consults the environment. Callers build a [`TmaskPaths`]
//! explicitly (or from a data root with [`TmaskPaths::from_data_root`]) and
//! hand the resulting [`TmaskConfig`] to the pipeline entry points.

use crate::core::robust_regression::RobustMethod;
use crate::types::{ThresholdMode, TmaskResult, REFLECTANCE_SCALE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default static residual threshold, in unscaled reflectance units
pub const DEFAULT_STATIC_THRESHOLD: f32 = 0.04;

/// Resolved input/output locations for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmaskPaths {
    /// Text file with one image path per line, ascending by date
    pub analytic_list: PathBuf,
    /// Text file with one ordinal day per line, aligned with `analytic_list`
    pub date_list: PathBuf,
    /// Directory holding persisted model arrays
    pub coefficients_dir: PathBuf,
    /// Directory receiving `_pred` and `_cloud` rasters
    pub results_dir: PathBuf,
    /// Directory receiving corner-pixel diagnostic series
    pub plots_dir: PathBuf,
}

impl TmaskPaths {
    /// Standard layout below a data root:
    /// `toar_images/{image_list,juliandate_list}.txt`, `coeffs/`, `results/`, `plots/`
    pub fn from_data_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        let images = root.join("toar_images");
        Self {
            analytic_list: images.join("image_list.txt"),
            date_list: images.join("juliandate_list.txt"),
            coefficients_dir: root.join("coeffs"),
            results_dir: root.join("results"),
            plots_dir: root.join("plots"),
        }
    }
}

impl Default for TmaskPaths {
    fn default() -> Self {
        Self::from_data_root(".")
    }
}

/// Complete configuration for the fit and classification passes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmaskConfig {
    pub paths: TmaskPaths,
    /// Exclude quality-mask cloud pixels from training
    pub use_quality_mask: bool,
    pub threshold_mode: ThresholdMode,
    /// Static threshold before scaling (0.04 = 4% reflectance)
    pub static_threshold: f32,
    /// Scale between stored integers and reflectance
    pub reflectance_scale: f32,
    /// Observation value excluded from fits
    pub null_value: Option<f64>,
    pub method: RobustMethod,
}

impl TmaskConfig {
    pub fn new(paths: TmaskPaths) -> Self {
        Self {
            paths,
            use_quality_mask: false,
            threshold_mode: ThresholdMode::Static,
            static_threshold: DEFAULT_STATIC_THRESHOLD,
            reflectance_scale: REFLECTANCE_SCALE,
            null_value: Some(0.0),
            method: RobustMethod::Bisquare,
        }
    }

    pub fn with_quality_mask(mut self, use_quality_mask: bool) -> Self {
        self.use_quality_mask = use_quality_mask;
        self
    }

    pub fn with_threshold_mode(mut self, mode: ThresholdMode) -> Self {
        self.threshold_mode = mode;
        self
    }

    /// Static threshold in stored (scaled) units
    pub fn scaled_static_threshold(&self) -> f32 {
        self.static_threshold * self.reflectance_scale
    }
}

impl Default for TmaskConfig {
    fn default() -> Self {
        Self::new(TmaskPaths::default())
    }
}

/// Create `dir`, or delete the plain files a previous run left in it
pub fn create_or_clean_dir(dir: &Path) -> TmaskResult<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            log::debug!("Removing stale output {}", path.display());
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_root_layout() {
        let paths = TmaskPaths::from_data_root("/data");
        assert_eq!(paths.analytic_list, PathBuf::from("/data/toar_images/image_list.txt"));
        assert_eq!(paths.date_list, PathBuf::from("/data/toar_images/juliandate_list.txt"));
        assert_eq!(paths.coefficients_dir, PathBuf::from("/data/coeffs"));
        assert_eq!(paths.results_dir, PathBuf::from("/data/results"));
    }

    #[test]
    fn test_clean_dir_keeps_subdirectories() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("results");
        create_or_clean_dir(&dir).unwrap();
        assert!(dir.is_dir());

        std::fs::write(dir.join("old_cloud.tif"), b"stale").unwrap();
        std::fs::create_dir(dir.join("keep")).unwrap();
        create_or_clean_dir(&dir).unwrap();

        assert!(!dir.join("old_cloud.tif").exists());
        assert!(dir.join("keep").is_dir());
    }

    #[test]
    fn test_default_static_threshold_is_scaled() {
        let config = TmaskConfig::new(TmaskPaths::from_data_root("/data"));
        assert!((config.scaled_static_threshold() - 400.0).abs() < 1e-3);
        assert_eq!(config.threshold_mode, ThresholdMode::Static);
    }
}
