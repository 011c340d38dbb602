//! Acoustic feature file readers
//!
//! Supports the two on-disk layouts written by the corpus preparation scripts:
//!
//! | Format | Layout |
//! |--------|--------|
//! | `numpy` | NPY, `<f4` or `<f8`, shape `(T, D)` or `(T,)` |
//! | `htk`   | 12-byte big-endian header, then `T × D` big-endian `f32` |

use std::fs;
use std::path::Path;

use ndarray::ArrayD;
use ndarray_npy::{ReadNpyError, ReadNpyExt};

use super::frames::FrameMatrix;
use super::SaveFormat;
use crate::error::{VizError, VizResult};

const HTK_HEADER_LEN: usize = 12;
/// HTK `_C` qualifier: compressed 16-bit features
const HTK_COMPRESSED: u16 = 0o2000;

/// Read a feature file in the given format
///
/// # Errors
///
/// Returns [`VizError::Dataset`] if the file cannot be read or decoded.
pub fn read_features(path: &Path, format: SaveFormat) -> VizResult<FrameMatrix> {
    let bytes = fs::read(path)
        .map_err(|e| VizError::Dataset(format!("cannot read {}: {e}", path.display())))?;
    let parsed = match format {
        SaveFormat::Numpy => parse_npy(&bytes),
        SaveFormat::Htk => parse_htk(&bytes),
    };
    parsed.map_err(|e| match e {
        VizError::Dataset(msg) => VizError::Dataset(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Decode an in-memory `.npy` buffer
///
/// `<f8` arrays are narrowed to `f32`. Frames come out in logical row order
/// whatever the file's memory order.
///
/// # Errors
///
/// Returns [`VizError::Dataset`] for a malformed header, an unsupported dtype,
/// a shape whose size overflows, rank above 2, or truncated data.
pub fn parse_npy(bytes: &[u8]) -> VizResult<FrameMatrix> {
    let array = match ArrayD::<f32>::read_npy(bytes) {
        Ok(array) => array,
        Err(ReadNpyError::WrongDescriptor(_)) => ArrayD::<f64>::read_npy(bytes)
            .map_err(npy_error)?
            .mapv(|v| v as f32),
        Err(e) => return Err(npy_error(e)),
    };

    let (num_frames, dim) = match array.shape() {
        [t] => (*t, 1),
        [t, d] => (*t, *d),
        shape => {
            return Err(VizError::Dataset(format!(
                "expected a 1-D or 2-D array, got shape {shape:?}"
            )))
        }
    };
    FrameMatrix::new(array.iter().copied().collect(), num_frames, dim)
}

fn npy_error(err: ReadNpyError) -> VizError {
    match err {
        ReadNpyError::LengthOverflow => VizError::Dataset("NPY shape too large".into()),
        ReadNpyError::WrongDescriptor(descr) => {
            VizError::Dataset(format!("unsupported NPY dtype {descr}"))
        }
        other => VizError::Dataset(format!("invalid NPY data: {other}")),
    }
}

/// Decode an in-memory HTK feature buffer
///
/// # Errors
///
/// Returns [`VizError::Dataset`] for a short header, compressed features, or truncated data.
pub fn parse_htk(bytes: &[u8]) -> VizResult<FrameMatrix> {
    if bytes.len() < HTK_HEADER_LEN {
        return Err(VizError::Dataset("truncated HTK header".into()));
    }
    let num_frames = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let sample_size = u16::from_be_bytes([bytes[8], bytes[9]]) as usize;
    let parm_kind = u16::from_be_bytes([bytes[10], bytes[11]]);

    if parm_kind & HTK_COMPRESSED != 0 {
        return Err(VizError::Dataset("compressed HTK features are not supported".into()));
    }
    if sample_size % 4 != 0 {
        return Err(VizError::Dataset(format!(
            "HTK sample size {sample_size} is not a multiple of 4"
        )));
    }

    let dim = sample_size / 4;
    let body = &bytes[HTK_HEADER_LEN..];
    let needed = num_frames
        .checked_mul(sample_size)
        .ok_or_else(|| VizError::Dataset("HTK shape too large".into()))?;
    if body.len() < needed {
        return Err(VizError::Dataset("truncated HTK data".into()));
    }
    let data = body
        .chunks_exact(4)
        .take(num_frames * dim)
        .map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    FrameMatrix::new(data, num_frames, dim)
}

#[cfg(test)]
pub(crate) mod test_support {
    use ndarray::Array2;
    use ndarray_npy::WriteNpyExt;

    /// Encode a `(rows × cols)` f32 matrix as NPY
    pub fn npy_bytes(values: &[f32], rows: usize, cols: usize) -> Vec<u8> {
        let array = Array2::from_shape_vec((rows, cols), values.to_vec()).expect("shape");
        let mut bytes = Vec::new();
        array.write_npy(&mut bytes).expect("write npy");
        bytes
    }

    /// NPY v1 file with a literal header dict and raw body
    pub fn npy_with_header(dict: &str, body: &[u8]) -> Vec<u8> {
        let mut header = dict.to_string();
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    /// Encode a `(rows × cols)` f32 matrix as uncompressed HTK
    pub fn htk_bytes(values: &[f32], rows: usize, cols: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(rows as u32).to_be_bytes());
        bytes.extend_from_slice(&100_000u32.to_be_bytes());
        bytes.extend_from_slice(&((cols * 4) as u16).to_be_bytes());
        bytes.extend_from_slice(&9u16.to_be_bytes());
        for v in values {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use ndarray_npy::WriteNpyExt;

    use super::test_support::{htk_bytes, npy_bytes, npy_with_header};
    use super::*;

    #[test]
    fn test_parse_npy_f32() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = parse_npy(&npy_bytes(&values, 3, 2)).expect("npy");
        assert_eq!(m.num_frames(), 3);
        assert_eq!(m.dim(), 2);
        assert_eq!(m.frame(2), &[5.0, 6.0]);
    }

    #[test]
    fn test_parse_npy_one_dimensional() {
        let body: Vec<u8> = [1.0f32, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = npy_with_header(
            "{'descr': '<f4', 'fortran_order': False, 'shape': (2,), }",
            &body,
        );
        let m = parse_npy(&bytes).expect("npy");
        assert_eq!((m.num_frames(), m.dim()), (2, 1));
        assert_eq!(m.frame(1), &[2.0]);
    }

    #[test]
    fn test_parse_npy_f64_is_narrowed() {
        let array = Array2::from_shape_vec((2, 2), vec![0.5f64, 1.5, -2.0, 4.25]).expect("shape");
        let mut bytes = Vec::new();
        array.write_npy(&mut bytes).expect("write npy");
        let m = parse_npy(&bytes).expect("npy");
        assert_eq!((m.num_frames(), m.dim()), (2, 2));
        assert_eq!(m.frame(1), &[-2.0, 4.25]);
    }

    #[test]
    fn test_parse_npy_fortran_order_reads_rows() {
        let body: Vec<u8> = [1.0f32, 3.0, 2.0, 4.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let bytes = npy_with_header(
            "{'descr': '<f4', 'fortran_order': True, 'shape': (2, 2), }",
            &body,
        );
        let m = parse_npy(&bytes).expect("npy");
        assert_eq!(m.frame(0), &[1.0, 2.0]);
        assert_eq!(m.frame(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_parse_npy_huge_shape_is_an_error() {
        let bytes = npy_with_header(
            "{'descr': '<f4', 'fortran_order': False, 'shape': (18446744073709551615, 2), }",
            &[0u8; 8],
        );
        let result = std::panic::catch_unwind(|| parse_npy(&bytes));
        let err = result
            .expect("must not panic")
            .expect_err("shape overflows");
        assert!(matches!(err, VizError::Dataset(_)), "{err}");
    }

    #[test]
    fn test_parse_npy_rejects_unsupported_dtype_and_rank() {
        let bytes = npy_with_header(
            "{'descr': '<i4', 'fortran_order': False, 'shape': (2,), }",
            &[0u8; 8],
        );
        assert!(matches!(parse_npy(&bytes), Err(VizError::Dataset(_))));

        let body = vec![0u8; 8 * 4];
        let bytes = npy_with_header(
            "{'descr': '<f4', 'fortran_order': False, 'shape': (2, 2, 2), }",
            &body,
        );
        let err = parse_npy(&bytes).expect_err("rank 3");
        assert!(err.to_string().contains("1-D or 2-D"));
    }

    #[test]
    fn test_parse_npy_rejects_garbage() {
        assert!(parse_npy(b"not numpy at all").is_err());
        let mut bytes = npy_bytes(&[1.0, 2.0], 1, 2);
        bytes.truncate(bytes.len() - 4);
        assert!(parse_npy(&bytes).is_err());
    }

    #[test]
    fn test_parse_htk() {
        let values = [0.5, -0.5, 1.5, -1.5];
        let m = parse_htk(&htk_bytes(&values, 2, 2)).expect("htk");
        assert_eq!(m.num_frames(), 2);
        assert_eq!(m.frame(1), &[1.5, -1.5]);
    }

    #[test]
    fn test_parse_htk_rejects_compressed() {
        let mut bytes = htk_bytes(&[0.0; 2], 1, 2);
        bytes[10..12].copy_from_slice(&(9u16 | HTK_COMPRESSED).to_be_bytes());
        assert!(parse_htk(&bytes).is_err());
    }

    #[test]
    fn test_read_features_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("spk1_utt1.npy");
        fs::write(&path, npy_bytes(&[1.0, 2.0], 2, 1)).expect("write");
        let m = read_features(&path, SaveFormat::Numpy).expect("read");
        assert_eq!(m.num_frames(), 2);

        let err = read_features(&dir.path().join("missing.npy"), SaveFormat::Numpy)
            .expect_err("missing file");
        assert!(err.to_string().contains("missing.npy"));
    }
}
