use ndarray::{Array2, Array3, Array4};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Scaled reflectance as stored in the input rasters (reflectance x 10 000)
pub type Reflectance = u16;

/// 4D reflectance stack (time x band x row x col)
pub type ReflectanceStack = Array4<Reflectance>;

/// Predicted reflectance stack (time x band x row x col)
pub type PredictionStack = Array4<f32>;

/// Per-band coefficient stack (band x param x row x col)
pub type CoefficientStack = Array4<f32>;

/// Per-band statistic image (band x row x col)
pub type BandStatistic = Array3<f32>;

/// Single-scene categorical mask (row x col)
pub type MaskImage = Array2<u8>;

/// Number of reflectance bands carried through the whole pipeline
pub const NUM_BANDS: usize = 4;

/// Multiplier applied to top-of-atmosphere reflectance in the input rasters
pub const REFLECTANCE_SCALE: f32 = 10_000.0;

/// Spectral bands, in stack order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Blue,
    Green,
    Red,
    Nir,
}

impl Band {
    pub const ALL: [Band; NUM_BANDS] = [Band::Blue, Band::Green, Band::Red, Band::Nir];

    /// Position of the band on the stack's band axis
    pub fn index(self) -> usize {
        match self {
            Band::Blue => 0,
            Band::Green => 1,
            Band::Red => 2,
            Band::Nir => 3,
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Band::Blue => write!(f, "Blue"),
            Band::Green => write!(f, "Green"),
            Band::Red => write!(f, "Red"),
            Band::Nir => write!(f, "NIR"),
        }
    }
}

/// How residual thresholds are chosen and how band exceedances combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdMode {
    /// Fixed threshold; cloud from green, shadow from NIR
    Static,
    /// Per-pixel RMSE threshold; all four bands must agree
    Dynamic,
}

impl std::fmt::Display for ThresholdMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdMode::Static => write!(f, "static"),
            ThresholdMode::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }
}

/// Grid shared by every raster of a stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterGeometry {
    pub width: usize,
    pub height: usize,
    /// Projection as WKT (may be empty for ungeoreferenced rasters)
    pub projection: String,
    pub geo_transform: GeoTransform,
}

/// Error types for TMASK processing
#[derive(Debug, thiserror::Error)]
pub enum TmaskError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing file: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for TMASK operations
pub type TmaskResult<T> = Result<T, TmaskError>;

impl TmaskError {
    /// Missing-file error if `path` does not exist
    pub fn require_file(path: &std::path::Path) -> TmaskResult<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(TmaskError::MissingFile {
                path: path.to_path_buf(),
            })
        }
    }
}
