use ndarray::{Array2, Axis};

/// Median filter used to remove isolated detections from mask layers
#[derive(Debug, Clone)]
pub struct MedianFilter {
    /// Odd window edge length
    window_size: usize,
}

impl MedianFilter {
    /// 3x3 median filter
    pub fn new() -> Self {
        Self { window_size: 3 }
    }

    /// Filter `image`; borders are mirrored (edge sample repeated)
    pub fn apply<T>(&self, image: &Array2<T>) -> Array2<T>
    where
        T: Copy + PartialOrd + Default + Send + Sync,
    {
        let (height, width) = image.dim();
        let mut filtered = Array2::<T>::default((height, width));
        if height == 0 || width == 0 {
            return filtered;
        }

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            filtered
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(i, mut row)| {
                    let mut window = Vec::with_capacity(self.window_size * self.window_size);
                    for j in 0..width {
                        row[j] = self.window_median(image, i, j, &mut window);
                    }
                });
        }

        #[cfg(not(feature = "parallel"))]
        for (i, mut row) in filtered.axis_iter_mut(Axis(0)).enumerate() {
            let mut window = Vec::with_capacity(self.window_size * self.window_size);
            for j in 0..width {
                row[j] = self.window_median(image, i, j, &mut window);
            }
        }

        filtered
    }

    fn window_median<T>(&self, image: &Array2<T>, i: usize, j: usize, window: &mut Vec<T>) -> T
    where
        T: Copy + PartialOrd,
    {
        let (height, width) = image.dim();
        let half = (self.window_size / 2) as isize;

        window.clear();
        for di in -half..=half {
            let ii = reflect_index(i as isize + di, height);
            for dj in -half..=half {
                let jj = reflect_index(j as isize + dj, width);
                window.push(image[[ii, jj]]);
            }
        }

        window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        window[window.len() / 2]
    }
}

impl Default for MedianFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Mirror an out-of-range index back into `0..len` (d c b a | a b c d | d c b a)
fn reflect_index(index: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let m = index.rem_euclid(period);
    if m < len as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}
