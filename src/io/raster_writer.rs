use crate::types::{RasterGeometry, TmaskError, TmaskResult};
use gdal::raster::{Buffer, GdalType};
use gdal::{Dataset, DriverManager};
use ndarray::{ArrayView2, ArrayView3, Axis};
use std::path::{Path, PathBuf};

/// Suffix of the encoded cloud/shadow mask rasters
pub const CLOUD_SUFFIX: &str = "_cloud";
/// Suffix of the model prediction rasters
pub const PREDICTION_SUFFIX: &str = "_pred";

/// `<dir>/<stem><suffix><ext>` for an input image
pub fn derived_path(dir: &Path, image: &Path, suffix: &str) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match image.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    dir.join(name)
}

/// GeoTIFF writer bound to one output grid
pub struct GeoTiffWriter {
    geometry: RasterGeometry,
}

impl GeoTiffWriter {
    pub fn new(geometry: RasterGeometry) -> Self {
        Self { geometry }
    }

    fn create<T: GdalType>(&self, output_path: &Path, bands: usize) -> TmaskResult<Dataset> {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<T, _>(
            output_path,
            self.geometry.width as isize,
            self.geometry.height as isize,
            bands as isize,
        )?;

        dataset.set_geo_transform(&self.geometry.geo_transform.to_gdal())?;
        if !self.geometry.projection.is_empty() {
            dataset.set_projection(&self.geometry.projection)?;
        }
        Ok(dataset)
    }

    fn check_grid(&self, rows: usize, cols: usize) -> TmaskResult<()> {
        if rows != self.geometry.height || cols != self.geometry.width {
            return Err(TmaskError::Shape(format!(
                "Raster is {}x{} but the output grid is {}x{}",
                cols, rows, self.geometry.width, self.geometry.height
            )));
        }
        Ok(())
    }

    /// Write a multi-band Float32 raster (band x row x col)
    pub fn write_prediction<P: AsRef<Path>>(
        &self,
        image: ArrayView3<'_, f32>,
        output_path: P,
    ) -> TmaskResult<()> {
        let (bands, height, width) = image.dim();
        self.check_grid(height, width)?;
        log::debug!("Writing prediction raster {}", output_path.as_ref().display());

        let dataset = self.create::<f32>(output_path.as_ref(), bands)?;
        for (b, band) in image.axis_iter(Axis(0)).enumerate() {
            let mut rasterband = dataset.rasterband(b as isize + 1)?;
            let flat_data: Vec<f32> = band.iter().cloned().collect();
            let buffer = Buffer::new((width, height), flat_data);
            rasterband.write((0, 0), (width, height), &buffer)?;
        }
        Ok(())
    }

    /// Write a single-band Byte mask raster
    pub fn write_mask<P: AsRef<Path>>(&self, mask: ArrayView2<'_, u8>, output_path: P) -> TmaskResult<()> {
        let (height, width) = mask.dim();
        self.check_grid(height, width)?;
        log::info!("Writing mask raster {}", output_path.as_ref().display());

        let dataset = self.create::<u8>(output_path.as_ref(), 1)?;
        let mut rasterband = dataset.rasterband(1)?;
        let flat_data: Vec<u8> = mask.iter().cloned().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_names() {
        let dir = Path::new("/data/results");
        let image = Path::new("/data/toar_images/281332_3061411_2016-10-31_0c0b_toar.tif");
        assert_eq!(
            derived_path(dir, image, CLOUD_SUFFIX),
            PathBuf::from("/data/results/281332_3061411_2016-10-31_0c0b_toar_cloud.tif")
        );
        assert_eq!(
            derived_path(dir, Path::new("scene"), PREDICTION_SUFFIX),
            PathBuf::from("/data/results/scene_pred")
        );
    }
}
