//! Run configuration resolution
//!
//! Combines three sources into one immutable [`ResolvedConfig`]:
//!
//! 1. [`RunOptions`] supplied on the command line
//! 2. the training-time `param` section of `<model_path>/config.yml`
//! 3. the class count from `<metrics_dir>/vocab_num.yml`, keyed by
//!    `data_size` then `label_type`
//!
//! ```text
//! <model_path>/config.yml         -> TrainParams
//! <metrics_dir>/vocab_num.yml     -> VocabSizeTable -> num_classes
//! <metrics_dir>/vocab_files/<label_type>_<data_size>.txt
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dataset::{DataType, SaveFormat};
use crate::error::{VizError, VizResult};
use crate::model::{DeviceKind, EpochSelector, ModelType};
use crate::tokenizer::LabelKind;

/// File name of the persisted training configuration inside a model directory
pub const CONFIG_FILE_NAME: &str = "config.yml";

/// File name of the vocabulary-size lookup inside the metrics directory
pub const VOCAB_NUM_FILE_NAME: &str = "vocab_num.yml";

/// Directory holding per-label-type token files inside the metrics directory
pub const VOCAB_FILES_DIR: &str = "vocab_files";

/// Output directory created inside the model directory
pub const OUTPUT_DIR_NAME: &str = "attention_weights";

/// Training-time parameters persisted next to a trained model
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainParams {
    /// Architecture name (e.g. `attention`)
    pub model_type: String,
    /// Corpus size selector (e.g. `100h`)
    pub data_size: String,
    /// Label granularity (e.g. `character`, `word_freq10`)
    pub label_type: String,
    /// Frames spliced around each input frame
    pub splice: usize,
    /// Frames concatenated per stacked frame
    pub num_stack: usize,
    /// Stride between stacked frames
    pub num_skip: usize,
    /// Feature file format (`numpy` or `htk`)
    pub save_format: String,
    /// Every other training parameter, kept for model constructors
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    param: TrainParams,
}

impl TrainParams {
    /// Parse the `param` section out of a `config.yml` document
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] if the YAML is malformed or a required key is missing.
    pub fn from_yaml_str(yaml: &str) -> VizResult<Self> {
        let file: ConfigFile = serde_yaml::from_str(yaml)
            .map_err(|e| VizError::Config(format!("invalid {CONFIG_FILE_NAME}: {e}")))?;
        Ok(file.param)
    }

    /// Load `<model_path>/config.yml`
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] if the file is absent or malformed.
    pub fn load(model_path: &Path) -> VizResult<Self> {
        let path = model_path.join(CONFIG_FILE_NAME);
        let yaml = fs::read_to_string(&path)
            .map_err(|e| VizError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }
}

/// Class counts keyed by `data_size` then `label_type`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct VocabSizeTable(BTreeMap<String, BTreeMap<String, usize>>);

impl VocabSizeTable {
    /// Parse a `vocab_num.yml` document
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] if the YAML is malformed.
    pub fn from_yaml_str(yaml: &str) -> VizResult<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| VizError::Config(format!("invalid {VOCAB_NUM_FILE_NAME}: {e}")))
    }

    /// Load `<metrics_dir>/vocab_num.yml`
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] if the file is absent or malformed.
    pub fn load(metrics_dir: &Path) -> VizResult<Self> {
        let path = metrics_dir.join(VOCAB_NUM_FILE_NAME);
        let yaml = fs::read_to_string(&path)
            .map_err(|e| VizError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }

    /// Look up the class count for a corpus size and label type
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] if the pair is not in the table.
    pub fn lookup(&self, data_size: &str, label_type: &str) -> VizResult<usize> {
        self.0
            .get(data_size)
            .and_then(|by_label| by_label.get(label_type))
            .copied()
            .ok_or_else(|| {
                VizError::Config(format!(
                    "no vocabulary size for data_size '{data_size}' and label_type '{label_type}'"
                ))
            })
    }
}

/// Parameters supplied on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Directory of the trained model (config, checkpoints, output)
    pub model_path: PathBuf,
    /// Checkpoint to restore
    pub epoch: EpochSelector,
    /// Utterances per batch
    pub eval_batch_size: usize,
    /// Beam width (1 = greedy decoding)
    pub beam_width: usize,
    /// Decode step limit when EOS is never emitted
    pub max_decode_length: usize,
    /// Root of `vocab_num.yml` and `vocab_files/`
    pub metrics_dir: PathBuf,
    /// Root of the corpus index and feature files
    pub dataset_dir: PathBuf,
    /// Test partition to visualize
    pub data_type: DataType,
    /// Execution device requested for the model
    pub device: DeviceKind,
    /// Log an ASCII preview of each attention matrix
    pub preview: bool,
}

impl RunOptions {
    /// Options with the documented CLI defaults for the given model directory
    #[must_use]
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            epoch: EpochSelector::Latest,
            eval_batch_size: 1,
            beam_width: 1,
            max_decode_length: 600,
            metrics_dir: PathBuf::from("../metrics"),
            dataset_dir: PathBuf::from("../dataset"),
            data_type: DataType::TestClean,
            device: DeviceKind::Gpu(0),
            preview: false,
        }
    }
}

/// Fully resolved, immutable configuration for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Command-line options
    pub run: RunOptions,
    /// Training-time parameters
    pub params: TrainParams,
    /// Output classes excluding SOS/EOS
    pub num_classes: usize,
    /// Parsed architecture name
    pub model_type: ModelType,
    /// Parsed label granularity
    pub label_kind: LabelKind,
    /// Parsed feature file format
    pub save_format: SaveFormat,
}

impl ResolvedConfig {
    /// Resolve the configuration by reading the model and metrics directories
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] if `config.yml` or `vocab_num.yml` is missing or
    /// malformed, if the `(data_size, label_type)` pair is unknown, or if
    /// `model_type`, `label_type` or `save_format` is not recognised.
    pub fn resolve(run: RunOptions) -> VizResult<Self> {
        let params = TrainParams::load(&run.model_path)?;
        let table = VocabSizeTable::load(&run.metrics_dir)?;
        Self::from_parts(run, params, &table)
    }

    /// Resolve from already-loaded parts
    ///
    /// # Errors
    ///
    /// Same as [`ResolvedConfig::resolve`], minus the file reads.
    pub fn from_parts(
        run: RunOptions,
        params: TrainParams,
        table: &VocabSizeTable,
    ) -> VizResult<Self> {
        let num_classes = table.lookup(&params.data_size, &params.label_type)?;
        let model_type = ModelType::parse(&params.model_type)?;
        let label_kind = LabelKind::from_label_type(&params.label_type)?;
        let save_format = SaveFormat::parse(&params.save_format)?;

        Ok(Self {
            run,
            params,
            num_classes,
            model_type,
            label_kind,
            save_format,
        })
    }

    /// `<metrics_dir>/vocab_files/<label_type>_<data_size>.txt`
    #[must_use]
    pub fn vocab_file_path(&self) -> PathBuf {
        self.run.metrics_dir.join(VOCAB_FILES_DIR).join(format!(
            "{}_{}.txt",
            self.params.label_type, self.params.data_size
        ))
    }

    /// `<model_path>/attention_weights`
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.run.model_path.join(OUTPUT_DIR_NAME)
    }
}
