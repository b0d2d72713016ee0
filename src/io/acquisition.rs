use crate::types::{TmaskError, TmaskResult, NUM_BANDS};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Julian day number of 0001-01-01 minus one (chrono counts CE days from 1)
const JDN_CE_OFFSET: i64 = 1_721_425;

/// Band layout of the sensor that produced an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFamily {
    /// Blue, green, red, NIR in bands 1-4
    FourBand,
    /// Blue, green, red, red edge, NIR in bands 1-5
    FiveBand,
}

impl SourceFamily {
    /// Infer the band layout from the image file name
    pub fn detect(path: &Path) -> Self {
        if path.to_string_lossy().contains("RapidEye") {
            SourceFamily::FiveBand
        } else {
            SourceFamily::FourBand
        }
    }

    /// 1-based raster band holding logical band `band` (0-based stack index)
    pub fn raster_band(self, band: usize) -> isize {
        match self {
            SourceFamily::FiveBand if band + 1 >= NUM_BANDS => band as isize + 2,
            _ => band as isize + 1,
        }
    }
}

/// One scene of the time series
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    pub image: PathBuf,
    /// Ordinal (Julian) day of the acquisition
    pub date: f64,
    pub family: SourceFamily,
}

impl Acquisition {
    pub fn new(image: PathBuf, date: f64) -> Self {
        let family = SourceFamily::detect(&image);
        Self {
            image,
            date,
            family,
        }
    }

    /// Companion quality-mask (UDM) path for this image
    pub fn quality_mask_path(&self) -> PathBuf {
        quality_mask_path(&self.image)
    }
}

/// Derive a UDM path from a TOAR image path
///
/// `_resampled_toar` becomes `_udm_resampled`, any remaining `_toar` becomes
/// `_udm`, and the `toar_images` directory is swapped for `input`.
pub fn quality_mask_path(image: &Path) -> PathBuf {
    let name = image.to_string_lossy();
    let name = name.replace("_resampled_toar", "_udm_resampled");
    let name = name.replace("_toar", "_udm");
    PathBuf::from(name.replace("toar_images", "input"))
}

/// Read a list file, one entry per line, skipping blank lines
fn read_lines(path: &Path) -> TmaskResult<Vec<String>> {
    TmaskError::require_file(path)?;
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Read the ordered image list
pub fn read_image_list(path: &Path) -> TmaskResult<Vec<PathBuf>> {
    let images: Vec<PathBuf> = read_lines(path)?.into_iter().map(PathBuf::from).collect();
    log::debug!("Read {} image paths from {}", images.len(), path.display());
    Ok(images)
}

/// Read the ordinal date list
pub fn read_date_list(path: &Path) -> TmaskResult<Vec<f64>> {
    read_lines(path)?
        .iter()
        .enumerate()
        .map(|(i, line)| {
            line.parse::<f64>().map_err(|e| {
                TmaskError::InvalidFormat(format!(
                    "{} line {}: '{}' is not a date number ({})",
                    path.display(),
                    i + 1,
                    line,
                    e
                ))
            })
        })
        .collect()
}

/// Pair the image and date lists into acquisitions
pub fn read_acquisitions(image_list: &Path, date_list: &Path) -> TmaskResult<Vec<Acquisition>> {
    let images = read_image_list(image_list)?;
    let dates = read_date_list(date_list)?;

    if images.len() != dates.len() {
        return Err(TmaskError::Configuration(format!(
            "{} lists {} images but {} lists {} dates",
            image_list.display(),
            images.len(),
            date_list.display(),
            dates.len()
        )));
    }

    if images.is_empty() {
        return Err(TmaskError::Configuration(format!(
            "No images listed in {}",
            image_list.display()
        )));
    }

    if dates.windows(2).any(|w| w[1] < w[0]) {
        log::warn!("Acquisition dates in {} are not ascending", date_list.display());
    }

    Ok(images
        .into_iter()
        .zip(dates)
        .map(|(image, date)| Acquisition::new(image, date))
        .collect())
}

/// Calendar date of a (possibly fractional) Julian day number
pub fn date_from_julian_day(jdn: f64) -> Option<NaiveDate> {
    let days = jdn.floor() as i64 - JDN_CE_OFFSET;
    i32::try_from(days)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
}
