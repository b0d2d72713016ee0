//! Minimal NumPy `.npy` support for the persisted model arrays.
//!
//! Only what the coefficient store needs: version 1.0/2.0 files, C order,
//! little-endian numeric element types. Files written here load directly with
//! `numpy.load`, so downstream plotting can stay in Python.

use crate::types::{TmaskError, TmaskResult};
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8] = b"\x93NUMPY";

/// Element types that can be stored in `.npy` files
pub trait NpyElement: Copy + Default {
    /// NumPy dtype descriptor
    const DESCR: &'static str;
    const SIZE: usize;

    fn write_le(&self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_npy_element {
    ($t:ty, $descr:expr) => {
        impl NpyElement for $t {
            const DESCR: &'static str = $descr;
            const SIZE: usize = std::mem::size_of::<$t>();

            fn write_le(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_le_bytes(buf)
            }
        }
    };
}

impl_npy_element!(u8, "|u1");
impl_npy_element!(u16, "<u2");
impl_npy_element!(u32, "<u4");
impl_npy_element!(f32, "<f4");
impl_npy_element!(f64, "<f8");

/// Header text for `shape`, padded so the data starts on a 16-byte boundary
fn header_bytes<T: NpyElement>(shape: &[usize]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape_str = match dims.len() {
        0 => "()".to_string(),
        1 => format!("({},)", dims[0]),
        _ => format!("({})", dims.join(", ")),
    };
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        T::DESCR,
        shape_str
    );

    // magic (6) + version (2) + length (2) + dict + newline
    let unpadded = MAGIC.len() + 4 + dict.len() + 1;
    let pad = (16 - unpadded % 16) % 16;
    format!("{}{}\n", dict, " ".repeat(pad)).into_bytes()
}

/// Write `array` as a `.npy` file
pub fn write_npy<T, S, D, P>(path: P, array: &ArrayBase<S, D>) -> TmaskResult<()>
where
    T: NpyElement,
    S: Data<Elem = T>,
    D: Dimension,
    P: AsRef<Path>,
{
    let header = header_bytes::<T>(array.shape());
    let header_len = u16::try_from(header.len()).map_err(|_| {
        TmaskError::InvalidFormat(format!("NPY header too long for shape {:?}", array.shape()))
    })?;

    let mut data = Vec::with_capacity(array.len() * T::SIZE);
    // Logical (row-major) iteration order gives C layout regardless of strides
    for v in array.iter() {
        v.write_le(&mut data);
    }

    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(&header)?;
    writer.write_all(&data)?;
    writer.flush()?;

    log::debug!("Wrote {} ({:?})", path.as_ref().display(), array.shape());
    Ok(())
}

/// Parsed `.npy` header
#[derive(Debug, Clone, PartialEq)]
struct NpyHeader {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

fn parse_header(text: &str) -> TmaskResult<NpyHeader> {
    let descr_re = Regex::new(r"'descr'\s*:\s*'([^']+)'")
        .map_err(|e| TmaskError::Processing(e.to_string()))?;
    let order_re = Regex::new(r"'fortran_order'\s*:\s*(True|False)")
        .map_err(|e| TmaskError::Processing(e.to_string()))?;
    let shape_re = Regex::new(r"'shape'\s*:\s*\(([^)]*)\)")
        .map_err(|e| TmaskError::Processing(e.to_string()))?;

    let missing = |key: &str| TmaskError::InvalidFormat(format!("NPY header lacks '{}': {}", key, text));

    let descr = descr_re
        .captures(text)
        .map(|c| c[1].to_string())
        .ok_or_else(|| missing("descr"))?;
    let fortran_order = order_re
        .captures(text)
        .map(|c| &c[1] == "True")
        .ok_or_else(|| missing("fortran_order"))?;
    let shape_text = shape_re
        .captures(text)
        .map(|c| c[1].to_string())
        .ok_or_else(|| missing("shape"))?;

    let shape = shape_text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L').parse::<usize>().map_err(|_| {
                TmaskError::InvalidFormat(format!("Bad NPY shape entry '{}'", s))
            })
        })
        .collect::<TmaskResult<Vec<_>>>()?;

    Ok(NpyHeader {
        descr,
        fortran_order,
        shape,
    })
}

/// Read a `.npy` file holding elements of type `T`
pub fn read_npy<T: NpyElement, P: AsRef<Path>>(path: P) -> TmaskResult<ArrayD<T>> {
    let path = path.as_ref();
    TmaskError::require_file(path)?;

    let mut reader = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(TmaskError::InvalidFormat(format!(
            "{} is not an NPY file",
            path.display()
        )));
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        v => {
            return Err(TmaskError::InvalidFormat(format!(
                "{}: unsupported NPY version {}",
                path.display(),
                v
            )))
        }
    };

    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = parse_header(&String::from_utf8_lossy(&header))?;

    if header.descr != T::DESCR {
        return Err(TmaskError::InvalidFormat(format!(
            "{}: dtype '{}' does not match expected '{}'",
            path.display(),
            header.descr,
            T::DESCR
        )));
    }
    if header.fortran_order {
        return Err(TmaskError::InvalidFormat(format!(
            "{}: Fortran-ordered arrays are not supported",
            path.display()
        )));
    }

    let count: usize = header.shape.iter().product();
    let mut raw = vec![0u8; count * T::SIZE];
    reader.read_exact(&mut raw)?;
    let data: Vec<T> = raw.chunks_exact(T::SIZE).map(T::read_le).collect();

    ArrayD::from_shape_vec(IxDyn(&header.shape), data).map_err(|e| {
        TmaskError::InvalidFormat(format!("{}: {}", path.display(), e))
    })
}

/// Read a `.npy` file and check its dimensionality
pub fn read_npy_dim<T: NpyElement, D: Dimension, P: AsRef<Path>>(
    path: P,
) -> TmaskResult<ndarray::Array<T, D>> {
    let array = read_npy::<T, _>(path.as_ref())?;
    let shape = array.shape().to_vec();
    array.into_dimensionality::<D>().map_err(|_| {
        TmaskError::Shape(format!(
            "{} has shape {:?}, expected {} dimensions",
            path.as_ref().display(),
            shape,
            D::NDIM.map_or("any".to_string(), |n| n.to_string())
        ))
    })
}
