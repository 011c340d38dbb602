//! Test-partition dataset iteration
//!
//! Reads a corpus index, loads each utterance's features, applies frame
//! stacking and splicing, and yields zero-padded [`Batch`]es.
//!
//! # Layout
//!
//! ```text
//! <dataset_dir>/<save_format>/<data_size>/<data_type>.csv
//!     frame_num,input_path,transcript
//!     1234,test_clean/1089/1089-134686-0000.npy,12 5 0 7 ...
//! ```
//!
//! # Epochs
//!
//! The iterator wraps around after the last batch of a pass and never ends
//! on its own. The batch that completes a pass is flagged `is_new_epoch`;
//! consumers that want a single pass stop after handling that batch.

mod features;
mod frames;

pub use features::{parse_htk, parse_npy, read_features};
pub use frames::{splice_frames, stack_frames, FrameMatrix};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{VizError, VizResult};

/// Test partition of the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    /// Clean test set
    #[default]
    TestClean,
    /// Noisier test set
    TestOther,
}

impl DataType {
    /// Name used in index file names
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TestClean => "test_clean",
            Self::TestOther => "test_other",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk feature format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveFormat {
    /// `.npy` arrays
    Numpy,
    /// HTK parameter files
    Htk,
}

impl SaveFormat {
    /// Parse a `save_format` value
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] for anything but `numpy` or `htk`.
    pub fn parse(name: &str) -> VizResult<Self> {
        match name {
            "numpy" => Ok(Self::Numpy),
            "htk" => Ok(Self::Htk),
            other => Err(VizError::Config(format!("unknown save_format '{other}'"))),
        }
    }

    /// Name used in directory layouts
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Numpy => "numpy",
            Self::Htk => "htk",
        }
    }
}

/// One row of the corpus index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Utterance name (feature file stem)
    pub name: String,
    /// Frame count before stacking
    pub frame_num: usize,
    /// Feature file location
    pub input_path: PathBuf,
    /// Reference label indices
    pub labels: Vec<i64>,
}

/// Parse the CSV corpus index
///
/// Columns are located by header name, so an extra leading index column is
/// tolerated. Relative `input_path`s resolve against `base_dir`.
///
/// # Errors
///
/// Returns [`VizError::Dataset`] for a missing column or an unparsable row.
pub fn parse_index(text: &str, base_dir: &Path) -> VizResult<Vec<IndexEntry>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| VizError::Dataset("empty corpus index".into()))?
        .split(',')
        .map(str::trim)
        .collect();
    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| VizError::Dataset(format!("corpus index has no '{name}' column")))
    };
    let frame_col = column("frame_num")?;
    let path_col = column("input_path")?;
    let transcript_col = column("transcript")?;

    lines
        .enumerate()
        .map(|(row, line)| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let field = |col: usize| {
                fields.get(col).copied().ok_or_else(|| {
                    VizError::Dataset(format!("corpus index row {} is short", row + 1))
                })
            };

            let frame_num = field(frame_col)?.parse::<usize>().map_err(|_| {
                VizError::Dataset(format!("corpus index row {}: bad frame_num", row + 1))
            })?;
            let raw_path = PathBuf::from(field(path_col)?);
            let input_path = if raw_path.is_absolute() {
                raw_path
            } else {
                base_dir.join(raw_path)
            };
            let name = input_path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    VizError::Dataset(format!("corpus index row {}: bad input_path", row + 1))
                })?
                .to_string();
            let labels = field(transcript_col)?
                .split_whitespace()
                .map(|s| {
                    s.parse::<i64>().map_err(|_| {
                        VizError::Dataset(format!("corpus index row {}: bad label '{s}'", row + 1))
                    })
                })
                .collect::<VizResult<Vec<_>>>()?;

            Ok(IndexEntry {
                name,
                frame_num,
                input_path,
                labels,
            })
        })
        .collect()
}

/// Source of per-utterance features
pub trait FeatureSource {
    /// Load the raw (untransformed) features of one utterance
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Dataset`] if the features cannot be produced.
    fn load(&self, entry: &IndexEntry) -> VizResult<FrameMatrix>;
}

/// Features read from the files named in the index
#[derive(Debug, Clone, Copy)]
pub struct FeatureFiles {
    format: SaveFormat,
}

impl FeatureFiles {
    /// Reader for the given format
    #[must_use]
    pub const fn new(format: SaveFormat) -> Self {
        Self { format }
    }
}

impl FeatureSource for FeatureFiles {
    fn load(&self, entry: &IndexEntry) -> VizResult<FrameMatrix> {
        read_features(&entry.input_path, self.format)
    }
}

/// Features held in memory, keyed by utterance name
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeatures {
    by_name: HashMap<String, FrameMatrix>,
}

impl InMemoryFeatures {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an utterance's features
    pub fn insert(&mut self, name: impl Into<String>, features: FrameMatrix) {
        self.by_name.insert(name.into(), features);
    }
}

impl FeatureSource for InMemoryFeatures {
    fn load(&self, entry: &IndexEntry) -> VizResult<FrameMatrix> {
        self.by_name
            .get(&entry.name)
            .cloned()
            .ok_or_else(|| VizError::Dataset(format!("no features for '{}'", entry.name)))
    }
}

/// Iteration and transform settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetOptions {
    /// Utterances per batch
    pub batch_size: usize,
    /// Splice window
    pub splice: usize,
    /// Frames per stacked frame
    pub num_stack: usize,
    /// Stacking stride
    pub num_skip: usize,
    /// Sort utterances by frame count
    pub sort_utt: bool,
    /// Longest utterances first when sorting
    pub reverse: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            splice: 1,
            num_stack: 1,
            num_skip: 1,
            sort_utt: true,
            reverse: true,
        }
    }
}

/// Zero-padded group of utterances
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `(batch × max_frames × feature_dim)` row-major inputs
    pub inputs: Vec<f32>,
    /// Longest utterance in the batch, after stacking
    pub max_frames: usize,
    /// Values per (stacked, spliced) frame
    pub feature_dim: usize,
    /// Unpadded frame count per utterance
    pub input_lengths: Vec<usize>,
    /// Reference labels per utterance
    pub labels: Vec<Vec<i64>>,
    /// Label count per utterance
    pub label_lengths: Vec<usize>,
    /// Utterance names
    pub names: Vec<String>,
}

impl Batch {
    /// Number of utterances
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the batch holds no utterances
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn from_utterances(
        utterances: Vec<(FrameMatrix, &IndexEntry)>,
    ) -> VizResult<Self> {
        let feature_dim = utterances.first().map_or(0, |(m, _)| m.dim());
        if let Some((m, entry)) = utterances.iter().find(|(m, _)| m.dim() != feature_dim) {
            return Err(VizError::Dataset(format!(
                "utterance '{}' has {} features per frame, expected {feature_dim}",
                entry.name,
                m.dim()
            )));
        }
        let max_frames = utterances
            .iter()
            .map(|(m, _)| m.num_frames())
            .max()
            .unwrap_or(0);

        let stride = max_frames * feature_dim;
        let mut inputs = vec![0.0_f32; utterances.len() * stride];
        let mut batch = Self {
            inputs: Vec::new(),
            max_frames,
            feature_dim,
            input_lengths: Vec::with_capacity(utterances.len()),
            labels: Vec::with_capacity(utterances.len()),
            label_lengths: Vec::with_capacity(utterances.len()),
            names: Vec::with_capacity(utterances.len()),
        };
        for (i, (matrix, entry)) in utterances.into_iter().enumerate() {
            let values = matrix.as_slice();
            inputs[i * stride..i * stride + values.len()].copy_from_slice(values);
            batch.input_lengths.push(matrix.num_frames());
            batch.label_lengths.push(entry.labels.len());
            batch.labels.push(entry.labels.clone());
            batch.names.push(entry.name.clone());
        }
        batch.inputs = inputs;
        Ok(batch)
    }
}

/// Restartable batch iterator over one corpus partition
pub struct Dataset {
    entries: Vec<IndexEntry>,
    options: DatasetOptions,
    source: Box<dyn FeatureSource>,
    position: usize,
    epoch: usize,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("utterances", &self.entries.len())
            .field("options", &self.options)
            .field("position", &self.position)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl Dataset {
    /// Build a dataset over index entries
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] if the batch size or a transform parameter is zero.
    pub fn new(
        mut entries: Vec<IndexEntry>,
        options: DatasetOptions,
        source: Box<dyn FeatureSource>,
    ) -> VizResult<Self> {
        if options.batch_size == 0 {
            return Err(VizError::Config("batch size must be at least 1".into()));
        }
        if options.splice == 0 || options.num_stack == 0 || options.num_skip == 0 {
            return Err(VizError::Config(
                "splice, num_stack and num_skip must be at least 1".into(),
            ));
        }
        if options.sort_utt {
            if options.reverse {
                entries.sort_by(|a, b| b.frame_num.cmp(&a.frame_num));
            } else {
                entries.sort_by_key(|e| e.frame_num);
            }
        }
        Ok(Self {
            entries,
            options,
            source,
            position: 0,
            epoch: 0,
        })
    }

    /// Open `<dataset_dir>/<save_format>/<data_size>/<data_type>.csv` with on-disk features
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Dataset`] if the index cannot be read or parsed, and
    /// [`VizError::Config`] for invalid options.
    pub fn open(
        dataset_dir: &Path,
        save_format: SaveFormat,
        data_size: &str,
        data_type: DataType,
        options: DatasetOptions,
    ) -> VizResult<Self> {
        let index_dir = dataset_dir.join(save_format.as_str()).join(data_size);
        let index_path = index_dir.join(format!("{}.csv", data_type.as_str()));
        let text = fs::read_to_string(&index_path).map_err(|e| {
            VizError::Dataset(format!("cannot read {}: {e}", index_path.display()))
        })?;
        let entries = parse_index(&text, &index_dir)?;
        Self::new(entries, options, Box::new(FeatureFiles::new(save_format)))
    }

    /// Number of utterances in one pass
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the partition is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Batches in one pass
    #[must_use]
    pub fn batches_per_epoch(&self) -> usize {
        self.entries.len().div_ceil(self.options.batch_size)
    }

    /// Completed passes so far
    #[must_use]
    pub const fn epoch(&self) -> usize {
        self.epoch
    }

    /// Utterances in iteration order
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Change the batch size; takes effect from the next batch
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] if `batch_size` is zero.
    pub fn set_batch_size(&mut self, batch_size: usize) -> VizResult<()> {
        if batch_size == 0 {
            return Err(VizError::Config("batch size must be at least 1".into()));
        }
        self.options.batch_size = batch_size;
        Ok(())
    }

    /// Rewind to the start of a pass
    pub fn reset(&mut self) {
        self.position = 0;
    }

    fn load_utterance(&self, entry: &IndexEntry) -> VizResult<FrameMatrix> {
        let raw = self.source.load(entry)?;
        let stacked = stack_frames(&raw, self.options.num_stack, self.options.num_skip)?;
        splice_frames(&stacked, self.options.splice)
    }

    fn next_batch(&mut self) -> VizResult<(Batch, bool)> {
        let end = (self.position + self.options.batch_size).min(self.entries.len());
        let utterances = self.entries[self.position..end]
            .iter()
            .map(|entry| Ok((self.load_utterance(entry)?, entry)))
            .collect::<VizResult<Vec<_>>>()?;
        let batch = Batch::from_utterances(utterances)?;

        let is_new_epoch = end == self.entries.len();
        if is_new_epoch {
            self.position = 0;
            self.epoch += 1;
        } else {
            self.position = end;
        }
        Ok((batch, is_new_epoch))
    }
}

impl Iterator for Dataset {
    type Item = VizResult<(Batch, bool)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.next_batch())
    }
}
