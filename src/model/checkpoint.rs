//! Checkpoint discovery and restore
//!
//! Checkpoints are safetensors files named `model.epoch-<N>` inside the model
//! directory. Training bookkeeping travels in the safetensors `__metadata__`
//! map under the keys `epoch`, `step`, `lr` and `metric_dev_best`.
//!
//! # Epoch resolution
//!
//! - `Exact(n)` requires `model.epoch-<n>` to exist
//! - `Latest` picks the highest numeric epoch; names whose suffix is not an
//!   integer are ignored, and when two names parse to the same epoch the
//!   canonical spelling wins, then the lexicographically smaller name

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use safetensors::{Dtype, SafeTensors};

use crate::error::{VizError, VizResult};

/// File name prefix of a checkpoint
pub const CHECKPOINT_PREFIX: &str = "model.epoch-";

/// Which checkpoint to restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EpochSelector {
    /// Highest epoch present
    #[default]
    Latest,
    /// A specific epoch
    Exact(u32),
}

impl EpochSelector {
    /// Interpret the `--epoch` flag: `-1` means latest
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] for values below `-1` or above `u32::MAX`.
    pub fn from_cli(epoch: i64) -> VizResult<Self> {
        match epoch {
            -1 => Ok(Self::Latest),
            e => u32::try_from(e)
                .map(Self::Exact)
                .map_err(|_| VizError::Config(format!("invalid epoch {e}"))),
        }
    }
}

/// Canonical checkpoint file name for an epoch
#[must_use]
pub fn checkpoint_file_name(epoch: u32) -> String {
    format!("{CHECKPOINT_PREFIX}{epoch}")
}

/// Checkpoints in `dir`, ordered by epoch then by preference
///
/// # Errors
///
/// Returns [`VizError::Restore`] if the directory cannot be listed.
pub fn list_checkpoints(dir: &Path) -> VizResult<Vec<(u32, PathBuf)>> {
    let read_dir = fs::read_dir(dir)
        .map_err(|e| VizError::Restore(format!("cannot list {}: {e}", dir.display())))?;

    let mut found = Vec::new();
    for item in read_dir {
        let item = item?;
        let name = item.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(epoch) = name
            .strip_prefix(CHECKPOINT_PREFIX)
            .and_then(|suffix| suffix.parse::<u32>().ok())
        else {
            continue;
        };
        if item.file_type()?.is_file() {
            found.push((epoch, name.to_string(), item.path()));
        }
    }

    // Per epoch: canonical name first, then lexicographic
    found.sort_by(|(ea, na, _), (eb, nb, _)| {
        ea.cmp(eb)
            .then_with(|| {
                let ca = *na == checkpoint_file_name(*ea);
                let cb = *nb == checkpoint_file_name(*eb);
                cb.cmp(&ca)
            })
            .then_with(|| na.cmp(nb))
    });
    Ok(found.into_iter().map(|(e, _, p)| (e, p)).collect())
}

/// Resolve the checkpoint file for a selector
///
/// # Errors
///
/// Returns [`VizError::Restore`] if no checkpoint matches.
pub fn resolve_checkpoint(dir: &Path, selector: EpochSelector) -> VizResult<(u32, PathBuf)> {
    match selector {
        EpochSelector::Exact(epoch) => {
            let path = dir.join(checkpoint_file_name(epoch));
            if path.is_file() {
                Ok((epoch, path))
            } else {
                Err(VizError::Restore(format!(
                    "no checkpoint found at {}",
                    path.display()
                )))
            }
        }
        EpochSelector::Latest => {
            let all = list_checkpoints(dir)?;
            let latest_epoch = all.last().map(|(e, _)| *e).ok_or_else(|| {
                VizError::Restore(format!("no checkpoint in {}", dir.display()))
            })?;
            all.into_iter()
                .find(|(e, _)| *e == latest_epoch)
                .ok_or_else(|| VizError::Restore(format!("no checkpoint in {}", dir.display())))
        }
    }
}

/// Dense f32 tensor restored from a checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    /// Dimensions
    pub shape: Vec<usize>,
    /// Row-major values
    pub data: Vec<f32>,
}

/// Named parameters of a trained model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    tensors: BTreeMap<String, Tensor>,
}

impl StateDict {
    /// Empty state dict
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tensor
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(name.into(), tensor);
    }

    /// Look up a tensor
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Tensor names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Number of tensors
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether no tensors are present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total parameter count
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.tensors.values().map(|t| t.data.len()).sum()
    }
}

/// Training bookkeeping stored with a checkpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointInfo {
    /// Epoch the checkpoint was written at
    pub epoch: u32,
    /// Global training step
    pub step: Option<u64>,
    /// Learning rate at save time
    pub lr: Option<f64>,
    /// Best development-set metric so far
    pub metric_dev_best: Option<f64>,
}

/// A restored checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// File it was read from
    pub path: PathBuf,
    /// Training bookkeeping
    pub info: CheckpointInfo,
    /// Model parameters
    pub state_dict: StateDict,
}

impl Checkpoint {
    /// Find and read the checkpoint selected by `selector`
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Restore`] if no checkpoint matches or it cannot be decoded.
    pub fn load(dir: &Path, selector: EpochSelector) -> VizResult<Self> {
        let (epoch, path) = resolve_checkpoint(dir, selector)?;
        let bytes = fs::read(&path)
            .map_err(|e| VizError::Restore(format!("cannot read {}: {e}", path.display())))?;
        let (info, state_dict) = decode_checkpoint(&bytes, epoch)?;
        Ok(Self {
            path,
            info,
            state_dict,
        })
    }
}

/// Decode safetensors bytes into bookkeeping and parameters
///
/// `epoch` comes from the file name; a disagreeing `epoch` metadata entry is logged.
///
/// # Errors
///
/// Returns [`VizError::Restore`] for invalid safetensors data or unsupported dtypes.
pub fn decode_checkpoint(bytes: &[u8], epoch: u32) -> VizResult<(CheckpointInfo, StateDict)> {
    let (_, metadata) = SafeTensors::read_metadata(bytes)
        .map_err(|e| VizError::Restore(format!("invalid checkpoint header: {e}")))?;
    let meta = metadata.metadata().clone().unwrap_or_default();

    if let Some(stored) = meta.get("epoch").and_then(|v| v.parse::<u32>().ok()) {
        if stored != epoch {
            tracing::warn!(
                file_epoch = epoch,
                stored_epoch = stored,
                "checkpoint metadata disagrees with its file name"
            );
        }
    }
    let info = CheckpointInfo {
        epoch,
        step: meta.get("step").and_then(|v| v.parse().ok()),
        lr: meta.get("lr").and_then(|v| v.parse().ok()),
        metric_dev_best: meta.get("metric_dev_best").and_then(|v| v.parse().ok()),
    };

    let tensors = SafeTensors::deserialize(bytes)
        .map_err(|e| VizError::Restore(format!("invalid checkpoint: {e}")))?;
    let mut state_dict = StateDict::new();
    for (name, view) in tensors.tensors() {
        let bytes = view.data();
        let data: Vec<f32> = match view.dtype() {
            Dtype::F32 => bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            Dtype::F16 => bytes
                .chunks_exact(2)
                .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
            Dtype::BF16 => bytes
                .chunks_exact(2)
                .map(|b| half::bf16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
            other => {
                return Err(VizError::Restore(format!(
                    "tensor '{name}' has unsupported dtype {other:?}"
                )))
            }
        };
        state_dict.insert(
            name,
            Tensor {
                shape: view.shape().to_vec(),
                data,
            },
        );
    }

    Ok((info, state_dict))
}


#[cfg(test)]
mod tests {
    use super::test_support::checkpoint_bytes;
    use super::*;

    fn touch(dir: &Path, name: &str, epoch: u32) {
        let bytes = checkpoint_bytes(&[("decoder.weight", vec![2], vec![0.5, -0.5])], epoch);
        fs::write(dir.join(name), bytes).expect("write checkpoint");
    }

    #[test]
    fn test_epoch_selector_from_cli() {
        assert_eq!(EpochSelector::from_cli(-1).ok(), Some(EpochSelector::Latest));
        assert_eq!(EpochSelector::from_cli(0).ok(), Some(EpochSelector::Exact(0)));
        assert_eq!(EpochSelector::from_cli(12).ok(), Some(EpochSelector::Exact(12)));
        assert!(EpochSelector::from_cli(-2).is_err());
    }

    #[test]
    fn test_latest_is_highest_numeric_epoch() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "model.epoch-2", 2);
        touch(dir.path(), "model.epoch-10", 10);
        touch(dir.path(), "model.epoch-9", 9);
        touch(dir.path(), "model.epoch-best", 0);
        touch(dir.path(), "config.yml", 0);

        let (epoch, path) = resolve_checkpoint(dir.path(), EpochSelector::Latest).expect("latest");
        assert_eq!(epoch, 10);
        assert_eq!(path, dir.path().join("model.epoch-10"));
    }

    #[test]
    fn test_latest_tie_prefers_canonical_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "model.epoch-007", 7);
        touch(dir.path(), "model.epoch-7", 7);

        let (_, path) = resolve_checkpoint(dir.path(), EpochSelector::Latest).expect("latest");
        assert_eq!(path, dir.path().join("model.epoch-7"));
    }

    #[test]
    fn test_exact_epoch_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "model.epoch-3", 3);
        let err = resolve_checkpoint(dir.path(), EpochSelector::Exact(4)).expect_err("missing");
        assert!(matches!(err, VizError::Restore(_)));
    }

    #[test]
    fn test_no_checkpoints() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Checkpoint::load(dir.path(), EpochSelector::Latest).expect_err("empty dir");
        assert!(matches!(err, VizError::Restore(_)));
    }

    #[test]
    fn test_load_checkpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "model.epoch-5", 5);

        let checkpoint = Checkpoint::load(dir.path(), EpochSelector::Exact(5)).expect("load");
        assert_eq!(checkpoint.info.epoch, 5);
        assert_eq!(checkpoint.info.step, Some(1200));
        assert_eq!(checkpoint.info.metric_dev_best, None);
        let tensor = checkpoint
            .state_dict
            .get("decoder.weight")
            .expect("tensor present");
        assert_eq!(tensor.shape, vec![2]);
        assert_eq!(tensor.data, vec![0.5, -0.5]);
        assert_eq!(checkpoint.state_dict.num_parameters(), 2);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_checkpoint(b"definitely not safetensors", 1),
            Err(VizError::Restore(_))
        ));
    }
}
