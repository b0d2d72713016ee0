//! Provenance record written next to the persisted model arrays.

use crate::config::TmaskConfig;
use crate::core::design_matrix::HarmonicBasis;
use crate::types::{RasterGeometry, TmaskError, TmaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the manifest inside the coefficients directory
pub const MANIFEST_FILE: &str = "tmask_run.json";

/// What produced a set of model arrays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub processing_timestamp: DateTime<Utc>,
    pub processor_version: String,
    pub config: TmaskConfig,
    /// Grid of the fitted stack, used to georeference outputs
    pub geometry: RasterGeometry,
    pub basis: HarmonicBasis,
    pub images: Vec<PathBuf>,
    /// Pixels per band left with the NaN sentinel
    pub undefined_pixels: Vec<usize>,
}

impl RunManifest {
    pub fn new(
        config: TmaskConfig,
        geometry: RasterGeometry,
        basis: HarmonicBasis,
        images: Vec<PathBuf>,
        undefined_pixels: Vec<usize>,
    ) -> Self {
        Self {
            processing_timestamp: Utc::now(),
            processor_version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            geometry,
            basis,
            images,
            undefined_pixels,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, dir: P) -> TmaskResult<()> {
        let path = dir.as_ref().join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TmaskError::Processing(format!("Failed to serialise manifest: {}", e)))?;
        std::fs::write(&path, json)?;
        log::debug!("Wrote {}", path.display());
        Ok(())
    }

    /// Load the manifest if the fit pass left one
    pub fn load<P: AsRef<Path>>(dir: P) -> TmaskResult<Option<Self>> {
        let path = dir.as_ref().join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| TmaskError::InvalidFormat(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TmaskPaths;
    use crate::types::GeoTransform;

    #[test]
    fn test_manifest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = RasterGeometry {
            width: 30,
            height: 20,
            projection: String::new(),
            geo_transform: GeoTransform::from_gdal([500000.0, 3.0, 0.0, 4100000.0, 0.0, -3.0]),
        };
        let manifest = RunManifest::new(
            TmaskConfig::new(TmaskPaths::from_data_root(dir.path())),
            geometry.clone(),
            HarmonicBasis::from_dates(&[2_457_400.0, 2_457_800.0]).unwrap(),
            vec![PathBuf::from("a_toar.tif"), PathBuf::from("b_toar.tif")],
            vec![0, 0, 1, 0],
        );

        manifest.save(dir.path()).unwrap();
        let loaded = RunManifest::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.geometry, geometry);
        assert_eq!(loaded.basis.span_days, 400.0);
        assert_eq!(loaded.undefined_pixels, vec![0, 0, 1, 0]);
    }

    #[test]
    fn test_absent_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RunManifest::load(dir.path()).unwrap().is_none());
    }
}
