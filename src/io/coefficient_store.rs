use crate::io::npy::{read_npy_dim, write_npy};
use crate::types::{BandStatistic, CoefficientStack, Reflectance, ReflectanceStack, TmaskError, TmaskResult};
use ndarray::{s, Array1, Array2, Array3, Ix1, Ix2, Ix3, Ix4};
use std::path::{Path, PathBuf};

const COEFFS_COMPLETE: &str = "tmask_coeffs_complete";
const RMSE: &str = "tmask_rmse";
const NUM_ITER: &str = "tmask_numiter";
const ADJ_RSQ: &str = "tmask_adj_rsq";
const DATES: &str = "tmask_date";
const ANALYTIC_COMPLETE: &str = "tmask_analytic_complete";

/// Image corners whose single-pixel series are persisted for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    UpperLeft,
    LowerLeft,
    UpperRight,
    LowerRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::UpperLeft,
        Corner::LowerLeft,
        Corner::UpperRight,
        Corner::LowerRight,
    ];

    /// Short tag used in file names
    pub fn tag(self) -> &'static str {
        match self {
            Corner::UpperLeft => "ul",
            Corner::LowerLeft => "ll",
            Corner::UpperRight => "ur",
            Corner::LowerRight => "lr",
        }
    }

    /// (row, col) of the corner in a `rows` x `cols` grid
    pub fn pixel(self, rows: usize, cols: usize) -> (usize, usize) {
        let last_row = rows.saturating_sub(1);
        let last_col = cols.saturating_sub(1);
        match self {
            Corner::UpperLeft => (0, 0),
            Corner::LowerLeft => (last_row, 0),
            Corner::UpperRight => (0, last_col),
            Corner::LowerRight => (last_row, last_col),
        }
    }
}

impl std::fmt::Display for Corner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag().to_uppercase())
    }
}

/// Fitted model arrays for all bands
#[derive(Debug, Clone)]
pub struct ModelArrays {
    /// band x param x row x col
    pub coeffs: CoefficientStack,
    /// band x row x col
    pub rmse: BandStatistic,
    /// band x row x col
    pub num_iter: Array3<u32>,
    /// band x row x col
    pub adj_rsq: BandStatistic,
    /// Training dates
    pub dates: Array1<f64>,
}

/// Single-pixel subset for diagnostics
#[derive(Debug, Clone)]
pub struct CornerSeries {
    pub corner: Corner,
    /// band x param
    pub coeffs: Array2<f32>,
    /// date x band
    pub observed: Array2<Reflectance>,
}

/// Directory of persisted model arrays
#[derive(Debug, Clone)]
pub struct CoefficientStore {
    dir: PathBuf,
}

impl CoefficientStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the array named `name`
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.npy", name))
    }

    fn corner_name(kind: &str, corner: Corner) -> String {
        format!("tmask_{}_plot_{}", kind, corner.tag())
    }

    /// Persist coefficients, statistics, dates and corner coefficients
    pub fn save_model(&self, model: &ModelArrays) -> TmaskResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        log::info!("Writing model arrays to {}", self.dir.display());

        let (_, _, rows, cols) = model.coeffs.dim();
        for corner in Corner::ALL {
            let (r, c) = corner.pixel(rows, cols);
            let subset = model.coeffs.slice(s![.., .., r, c]);
            write_npy(self.path(&Self::corner_name("coeffs", corner)), &subset)?;
        }

        write_npy(self.path(COEFFS_COMPLETE), &model.coeffs)?;
        write_npy(self.path(DATES), &model.dates)?;
        write_npy(self.path(RMSE), &model.rmse)?;
        write_npy(self.path(NUM_ITER), &model.num_iter)?;
        write_npy(self.path(ADJ_RSQ), &model.adj_rsq)?;
        Ok(())
    }

    /// Persist the observed stack and its corner series
    pub fn save_stack(&self, stack: &ReflectanceStack) -> TmaskResult<()> {
        std::fs::create_dir_all(&self.dir)?;

        let (_, _, rows, cols) = stack.dim();
        for corner in Corner::ALL {
            let (r, c) = corner.pixel(rows, cols);
            let subset = stack.slice(s![.., .., r, c]);
            write_npy(self.path(&Self::corner_name("analytic", corner)), &subset)?;
        }

        write_npy(self.path(ANALYTIC_COMPLETE), stack)
    }

    pub fn load_coefficients(&self) -> TmaskResult<CoefficientStack> {
        read_npy_dim::<f32, Ix4, _>(self.path(COEFFS_COMPLETE))
    }

    pub fn load_rmse(&self) -> TmaskResult<BandStatistic> {
        read_npy_dim::<f32, Ix3, _>(self.path(RMSE))
    }

    pub fn load_dates(&self) -> TmaskResult<Array1<f64>> {
        read_npy_dim::<f64, Ix1, _>(self.path(DATES))
    }

    pub fn load_stack(&self) -> TmaskResult<ReflectanceStack> {
        read_npy_dim::<Reflectance, Ix4, _>(self.path(ANALYTIC_COMPLETE))
    }

    /// Everything written by [`save_model`](Self::save_model)
    pub fn load_model(&self) -> TmaskResult<ModelArrays> {
        let model = ModelArrays {
            coeffs: self.load_coefficients()?,
            rmse: self.load_rmse()?,
            num_iter: read_npy_dim::<u32, Ix3, _>(self.path(NUM_ITER))?,
            adj_rsq: read_npy_dim::<f32, Ix3, _>(self.path(ADJ_RSQ))?,
            dates: self.load_dates()?,
        };

        let (bands, _, rows, cols) = model.coeffs.dim();
        if model.rmse.dim() != (bands, rows, cols) {
            return Err(TmaskError::Shape(format!(
                "RMSE shape {:?} does not match coefficients {:?}",
                model.rmse.dim(),
                model.coeffs.dim()
            )));
        }
        Ok(model)
    }

    pub fn load_corner(&self, corner: Corner) -> TmaskResult<CornerSeries> {
        Ok(CornerSeries {
            corner,
            coeffs: read_npy_dim::<f32, Ix2, _>(self.path(&Self::corner_name("coeffs", corner)))?,
            observed: read_npy_dim::<Reflectance, Ix2, _>(
                self.path(&Self::corner_name("analytic", corner)),
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn sample_model(rows: usize, cols: usize) -> ModelArrays {
        ModelArrays {
            coeffs: Array4::from_shape_fn((4, 5, rows, cols), |(b, p, r, c)| {
                (b * 1000 + p * 100 + r * 10 + c) as f32
            }),
            rmse: Array3::from_elem((4, rows, cols), 12.5),
            num_iter: Array3::from_elem((4, rows, cols), 3),
            adj_rsq: Array3::from_elem((4, rows, cols), 0.9),
            dates: Array1::from(vec![2_457_400.0, 2_457_430.5, 2_457_470.0]),
        }
    }

    #[test]
    fn test_model_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = CoefficientStore::new(dir.path().join("coeffs"));
        let model = sample_model(3, 4);

        store.save_model(&model).unwrap();
        let loaded = store.load_model().unwrap();

        assert_eq!(loaded.coeffs, model.coeffs);
        assert_eq!(loaded.rmse, model.rmse);
        assert_eq!(loaded.num_iter, model.num_iter);
        assert_eq!(loaded.dates, model.dates);
    }

    #[test]
    fn test_corner_subsets() {
        let dir = tempfile::tempdir().unwrap();
        let store = CoefficientStore::new(dir.path());
        let model = sample_model(3, 4);
        let stack = ReflectanceStack::from_shape_fn((3, 4, 3, 4), |(t, b, r, c)| {
            (t * 1000 + b * 100 + r * 10 + c) as Reflectance
        });

        store.save_model(&model).unwrap();
        store.save_stack(&stack).unwrap();

        let lr = store.load_corner(Corner::LowerRight).unwrap();
        assert_eq!(lr.coeffs.dim(), (4, 5));
        assert_eq!(lr.coeffs[[1, 2]], model.coeffs[[1, 2, 2, 3]]);
        assert_eq!(lr.observed.dim(), (3, 4));
        assert_eq!(lr.observed[[2, 1]], stack[[2, 1, 2, 3]]);

        let ur = store.load_corner(Corner::UpperRight).unwrap();
        assert_eq!(ur.observed[[0, 0]], stack[[0, 0, 0, 3]]);
    }

    #[test]
    fn test_missing_coefficients_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = CoefficientStore::new(dir.path());
        match store.load_coefficients() {
            Err(TmaskError::MissingFile { path }) => {
                assert_eq!(path, dir.path().join("tmask_coeffs_complete.npy"))
            }
            other => panic!("unexpected result: {:?}", other.map(|c| c.dim())),
        }
    }

    #[test]
    fn test_corner_pixels() {
        assert_eq!(Corner::UpperLeft.pixel(10, 20), (0, 0));
        assert_eq!(Corner::LowerLeft.pixel(10, 20), (9, 0));
        assert_eq!(Corner::UpperRight.pixel(10, 20), (0, 19));
        assert_eq!(Corner::LowerRight.pixel(10, 20), (9, 19));
    }
}
