//! Frame-level input transforms
//!
//! Both transforms widen each frame by concatenating neighbouring frames:
//!
//! - **stacking** concatenates `num_stack` consecutive frames and advances by
//!   `num_skip`, so the output has `ceil(T / num_skip)` frames
//! - **splicing** concatenates a centered window of `splice` frames around every
//!   frame, keeping `T` frames
//!
//! Frames past either end are replaced by the nearest edge frame.

use crate::error::{VizError, VizResult};

/// Row-major `(num_frames × dim)` feature matrix
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMatrix {
    data: Vec<f32>,
    num_frames: usize,
    dim: usize,
}

impl FrameMatrix {
    /// Wrap row-major data
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Dataset`] if `data.len() != num_frames * dim`.
    pub fn new(data: Vec<f32>, num_frames: usize, dim: usize) -> VizResult<Self> {
        if data.len() != num_frames * dim {
            return Err(VizError::Dataset(format!(
                "feature buffer has {} values, expected {num_frames} x {dim}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            num_frames,
            dim,
        })
    }

    /// Build from a list of equally sized frames
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Dataset`] if frame sizes differ.
    pub fn from_rows(rows: &[Vec<f32>]) -> VizResult<Self> {
        let dim = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != dim) {
            return Err(VizError::Dataset("frames have different sizes".into()));
        }
        Self::new(rows.concat(), rows.len(), dim)
    }

    /// Number of frames
    #[must_use]
    pub const fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Values per frame
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Row-major values
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// One frame
    #[must_use]
    pub fn frame(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    /// Concatenate frames selected by `pick(output_index, offset)` into a wider matrix
    fn widen(&self, out_frames: usize, width: usize, pick: impl Fn(usize, usize) -> isize) -> Self {
        let last = self.num_frames.saturating_sub(1) as isize;
        let mut data = Vec::with_capacity(out_frames * width * self.dim);
        for t in 0..out_frames {
            for k in 0..width {
                let src = pick(t, k).clamp(0, last) as usize;
                data.extend_from_slice(self.frame(src));
            }
        }
        Self {
            data,
            num_frames: out_frames,
            dim: self.dim * width,
        }
    }
}

/// Stack `num_stack` frames with stride `num_skip`
///
/// # Errors
///
/// Returns [`VizError::Config`] if either parameter is zero.
pub fn stack_frames(input: &FrameMatrix, num_stack: usize, num_skip: usize) -> VizResult<FrameMatrix> {
    if num_stack == 0 || num_skip == 0 {
        return Err(VizError::Config(format!(
            "num_stack ({num_stack}) and num_skip ({num_skip}) must be at least 1"
        )));
    }
    if (num_stack == 1 && num_skip == 1) || input.num_frames() == 0 {
        return Ok(input.clone());
    }

    let out_frames = input.num_frames().div_ceil(num_skip);
    Ok(input.widen(out_frames, num_stack, |t, k| (t * num_skip + k) as isize))
}

/// Splice each frame with its neighbours in a centered window of `splice` frames
///
/// # Errors
///
/// Returns [`VizError::Config`] if `splice` is zero.
pub fn splice_frames(input: &FrameMatrix, splice: usize) -> VizResult<FrameMatrix> {
    if splice == 0 {
        return Err(VizError::Config("splice must be at least 1".into()));
    }
    if splice == 1 || input.num_frames() == 0 {
        return Ok(input.clone());
    }

    let left = ((splice - 1) / 2) as isize;
    Ok(input.widen(input.num_frames(), splice, |t, k| t as isize - left + k as isize))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frames [[0], [1], ..., [n-1]]
    fn ramp(n: usize) -> FrameMatrix {
        FrameMatrix::new((0..n).map(|i| i as f32).collect(), n, 1).expect("matrix")
    }

    #[test]
    fn test_frame_matrix_shape_check() {
        assert!(FrameMatrix::new(vec![0.0; 5], 2, 3).is_err());
        assert!(FrameMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
        let m = FrameMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).expect("matrix");
        assert_eq!(m.frame(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_stack_identity() {
        let m = ramp(4);
        assert_eq!(stack_frames(&m, 1, 1).expect("stack"), m);
    }

    #[test]
    fn test_stack_pads_with_last_frame() {
        let stacked = stack_frames(&ramp(5), 3, 2).expect("stack");
        assert_eq!(stacked.num_frames(), 3);
        assert_eq!(stacked.dim(), 3);
        assert_eq!(
            stacked.as_slice(),
            &[0.0, 1.0, 2.0, 2.0, 3.0, 4.0, 4.0, 4.0, 4.0]
        );
    }

    #[test]
    fn test_stack_rejects_zero() {
        assert!(matches!(stack_frames(&ramp(3), 0, 1), Err(VizError::Config(_))));
        assert!(matches!(stack_frames(&ramp(3), 2, 0), Err(VizError::Config(_))));
    }

    #[test]
    fn test_splice_centered_window() {
        let spliced = splice_frames(&ramp(3), 3).expect("splice");
        assert_eq!(spliced.num_frames(), 3);
        assert_eq!(spliced.dim(), 3);
        assert_eq!(
            spliced.as_slice(),
            &[0.0, 0.0, 1.0, 0.0, 1.0, 2.0, 1.0, 2.0, 2.0]
        );
    }

    #[test]
    fn test_splice_identity_and_empty() {
        let m = ramp(2);
        assert_eq!(splice_frames(&m, 1).expect("splice"), m);
        let empty = FrameMatrix::new(Vec::new(), 0, 4).expect("empty");
        assert_eq!(splice_frames(&empty, 5).expect("splice").num_frames(), 0);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(50))]

            #[test]
            fn property_stack_length(frames in 1usize..60, stack in 1usize..5, skip in 1usize..5) {
                let stacked = stack_frames(&ramp(frames), stack, skip).expect("stack");
                prop_assert_eq!(stacked.num_frames(), frames.div_ceil(skip));
                prop_assert_eq!(stacked.dim(), if stack == 1 && skip == 1 { 1 } else { stack });
            }

            #[test]
            fn property_splice_keeps_length(frames in 1usize..60, splice in 1usize..9) {
                let spliced = splice_frames(&ramp(frames), splice).expect("splice");
                prop_assert_eq!(spliced.num_frames(), frames);
                prop_assert_eq!(spliced.dim(), splice);
            }
        }
    }
}
