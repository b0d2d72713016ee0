use crate::io::acquisition::Acquisition;
use crate::types::{
    GeoTransform, RasterGeometry, Reflectance, ReflectanceStack, TmaskError, TmaskResult, NUM_BANDS,
};
use gdal::Dataset;
use ndarray::{Array2, ArrayViewMut3, Axis, Zip};
use std::path::Path;

/// Quality-mask bit marking cloud
pub const QUALITY_CLOUD_BIT: u8 = 2;

/// Reflectance stack plus the copy used for model training
#[derive(Debug, Clone)]
pub struct AssembledStack {
    /// Observed reflectance, untouched (time x band x row x col)
    pub observed: ReflectanceStack,
    /// Observed reflectance with quality-mask cloud pixels zeroed, if masks were applied
    pub training: Option<ReflectanceStack>,
    pub geometry: RasterGeometry,
}

impl AssembledStack {
    /// Stack the regression should be fitted on
    pub fn training_stack(&self) -> &ReflectanceStack {
        self.training.as_ref().unwrap_or(&self.observed)
    }

    pub fn num_dates(&self) -> usize {
        self.observed.dim().0
    }
}

/// Reads an ordered acquisition list into a dense reflectance stack
pub struct StackReader {
    use_quality_mask: bool,
}

impl StackReader {
    pub fn new(use_quality_mask: bool) -> Self {
        Self { use_quality_mask }
    }

    /// Grid geometry of a raster
    pub fn read_geometry<P: AsRef<Path>>(path: P) -> TmaskResult<RasterGeometry> {
        TmaskError::require_file(path.as_ref())?;
        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let geo_transform = dataset
            .geo_transform()
            .map(GeoTransform::from_gdal)
            .unwrap_or_default();

        Ok(RasterGeometry {
            width,
            height,
            projection: dataset.projection(),
            geo_transform,
        })
    }

    /// Assemble the stack for `acquisitions` (already in date order)
    pub fn assemble(&self, acquisitions: &[Acquisition]) -> TmaskResult<AssembledStack> {
        let first = acquisitions.first().ok_or_else(|| {
            TmaskError::Configuration("No acquisitions to assemble".to_string())
        })?;
        let last = &acquisitions[acquisitions.len() - 1];

        // Grid size from the last image, georeferencing from the first
        let shape_ref = Self::read_geometry(&last.image)?;
        let mut geometry = Self::read_geometry(&first.image)?;
        geometry.width = shape_ref.width;
        geometry.height = shape_ref.height;

        log::info!(
            "Assembling stack of {} images, {} bands, {}x{} pixels",
            acquisitions.len(),
            NUM_BANDS,
            geometry.width,
            geometry.height
        );

        let mut observed = ReflectanceStack::zeros((
            acquisitions.len(),
            NUM_BANDS,
            geometry.height,
            geometry.width,
        ));

        self.for_each_slot(&mut observed, acquisitions, |slot, acq| {
            log::debug!("Reading {}", acq.image.display());
            read_scene(acq, &geometry, slot)
        })?;

        let training = if self.use_quality_mask {
            log::info!("Excluding quality-mask cloud pixels from training");
            let mut training = observed.clone();
            self.for_each_slot(&mut training, acquisitions, |slot, acq| {
                let mask = read_quality_mask(acq, &geometry)?;
                apply_cloud_mask(slot, &mask);
                Ok(())
            })?;
            Some(training)
        } else {
            None
        };

        Ok(AssembledStack {
            observed,
            training,
            geometry,
        })
    }

    /// Run `f` on each time slot of `stack`; slots are independent
    #[cfg(feature = "parallel")]
    fn for_each_slot<F>(
        &self,
        stack: &mut ReflectanceStack,
        acquisitions: &[Acquisition],
        f: F,
    ) -> TmaskResult<()>
    where
        F: Fn(ArrayViewMut3<'_, Reflectance>, &Acquisition) -> TmaskResult<()> + Sync + Send,
    {
        use rayon::prelude::*;
        stack
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(acquisitions.par_iter())
            .try_for_each(|(slot, acq)| f(slot, acq))
    }

    #[cfg(not(feature = "parallel"))]
    fn for_each_slot<F>(
        &self,
        stack: &mut ReflectanceStack,
        acquisitions: &[Acquisition],
        f: F,
    ) -> TmaskResult<()>
    where
        F: Fn(ArrayViewMut3<'_, Reflectance>, &Acquisition) -> TmaskResult<()>,
    {
        stack
            .axis_iter_mut(Axis(0))
            .zip(acquisitions.iter())
            .try_for_each(|(slot, acq)| f(slot, acq))
    }
}

fn check_dimensions(path: &Path, dataset: &Dataset, geometry: &RasterGeometry) -> TmaskResult<()> {
    let (width, height) = dataset.raster_size();
    if width != geometry.width || height != geometry.height {
        return Err(TmaskError::Shape(format!(
            "{} is {}x{} but the stack grid is {}x{}",
            path.display(),
            width,
            height,
            geometry.width,
            geometry.height
        )));
    }
    Ok(())
}

/// Read the four logical bands of one scene into its time slot
fn read_scene(
    acq: &Acquisition,
    geometry: &RasterGeometry,
    mut slot: ArrayViewMut3<'_, Reflectance>,
) -> TmaskResult<()> {
    TmaskError::require_file(&acq.image)?;
    let dataset = Dataset::open(&acq.image)?;
    check_dimensions(&acq.image, &dataset, geometry)?;

    let (width, height) = (geometry.width, geometry.height);
    for band in 0..NUM_BANDS {
        let raster_band = acq.family.raster_band(band);
        let rasterband = dataset.rasterband(raster_band)?;
        let buffer = rasterband.read_as::<Reflectance>((0, 0), (width, height), (width, height), None)?;

        let data = Array2::from_shape_vec((height, width), buffer.data).map_err(|e| {
            TmaskError::Processing(format!(
                "Failed to reshape band {} of {}: {}",
                raster_band,
                acq.image.display(),
                e
            ))
        })?;
        slot.index_axis_mut(Axis(0), band).assign(&data);
    }

    Ok(())
}

/// Read the single-band quality mask belonging to `acq`
fn read_quality_mask(acq: &Acquisition, geometry: &RasterGeometry) -> TmaskResult<Array2<u8>> {
    let path = acq.quality_mask_path();
    TmaskError::require_file(&path)?;

    let dataset = Dataset::open(&path)?;
    check_dimensions(&path, &dataset, geometry)?;

    let (width, height) = (geometry.width, geometry.height);
    let rasterband = dataset.rasterband(1)?;
    let buffer = rasterband.read_as::<u8>((0, 0), (width, height), (width, height), None)?;

    Array2::from_shape_vec((height, width), buffer.data).map_err(|e| {
        TmaskError::Processing(format!("Failed to reshape {}: {}", path.display(), e))
    })
}

/// Zero every band where the quality mask carries the cloud bit
pub fn apply_cloud_mask(mut slot: ArrayViewMut3<'_, Reflectance>, quality: &Array2<u8>) {
    for mut band in slot.axis_iter_mut(Axis(0)) {
        Zip::from(&mut band).and(quality).for_each(|v, &q| {
            if q & QUALITY_CLOUD_BIT != 0 {
                *v = 0;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_cloud_bit_zeroes_all_bands() {
        let mut scene = Array3::<Reflectance>::from_elem((NUM_BANDS, 2, 2), 1200);
        let mut quality = Array2::<u8>::zeros((2, 2));
        quality[[0, 1]] = 2;
        quality[[1, 0]] = 1; // other bits leave the pixel alone
        quality[[1, 1]] = 3;

        apply_cloud_mask(scene.view_mut(), &quality);

        for band in 0..NUM_BANDS {
            assert_eq!(scene[[band, 0, 0]], 1200);
            assert_eq!(scene[[band, 0, 1]], 0);
            assert_eq!(scene[[band, 1, 0]], 1200);
            assert_eq!(scene[[band, 1, 1]], 0);
        }
    }

    #[test]
    fn test_training_stack_falls_back_to_observed() {
        let stack = AssembledStack {
            observed: ReflectanceStack::from_elem((2, NUM_BANDS, 1, 1), 7),
            training: None,
            geometry: RasterGeometry {
                width: 1,
                height: 1,
                projection: String::new(),
                geo_transform: GeoTransform::default(),
            },
        };
        assert_eq!(stack.training_stack()[[1, 3, 0, 0]], 7);
        assert_eq!(stack.num_dates(), 2);
    }

    #[test]
    fn test_empty_acquisition_list() {
        let result = StackReader::new(false).assemble(&[]);
        assert!(matches!(result, Err(TmaskError::Configuration(_))));
    }
}
