//! Attention model interface and loading
//!
//! Network architectures are not defined in this crate. A concrete model
//! implements [`AttentionModel`] and registers a constructor in a
//! [`ModelRegistry`] under its [`ModelType`]; [`load_model`] then builds it,
//! binds it to a device, restores a checkpoint, and switches it to inference
//! mode.
//!
//! # Loading sequence
//!
//! ```text
//! ModelRegistry::build ─► set_device(non-deterministic) ─► load_state_dict ─► eval
//! ```

mod checkpoint;
mod device;

pub use checkpoint::{
    checkpoint_file_name, decode_checkpoint, list_checkpoints, resolve_checkpoint, Checkpoint,
    CheckpointInfo, EpochSelector, StateDict, Tensor, CHECKPOINT_PREFIX,
};
pub use device::{DeviceKind, ExecutionDevice};

#[cfg(test)]
pub(crate) use checkpoint::test_support;

use std::collections::HashMap;

use crate::config::{ResolvedConfig, TrainParams};
use crate::dataset::Batch;
use crate::error::{VizError, VizResult};

/// Architecture family named by `model_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    /// Encoder-decoder with attention
    Attention,
    /// Attention model with an auxiliary sub-word output layer
    HierarchicalAttention,
    /// Attention model with nested character/word decoders
    NestedAttention,
    /// Connectionist temporal classification (no attention)
    Ctc,
    /// Hierarchical CTC (no attention)
    HierarchicalCtc,
}

impl ModelType {
    /// Parse a `model_type` value by exact match
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] for an unknown name.
    pub fn parse(name: &str) -> VizResult<Self> {
        match name {
            "attention" => Ok(Self::Attention),
            "hierarchical_attention" => Ok(Self::HierarchicalAttention),
            "nested_attention" => Ok(Self::NestedAttention),
            "ctc" => Ok(Self::Ctc),
            "hierarchical_ctc" => Ok(Self::HierarchicalCtc),
            other => Err(VizError::Config(format!("unknown model_type '{other}'"))),
        }
    }

    /// Name as written in `config.yml`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attention => "attention",
            Self::HierarchicalAttention => "hierarchical_attention",
            Self::NestedAttention => "nested_attention",
            Self::Ctc => "ctc",
            Self::HierarchicalCtc => "hierarchical_ctc",
        }
    }

    /// Whether the architecture produces attention weights
    #[must_use]
    pub const fn has_attention(self) -> bool {
        matches!(
            self,
            Self::Attention | Self::HierarchicalAttention | Self::NestedAttention
        )
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-major `(output steps × input steps)` attention weights
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionMatrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl AttentionMatrix {
    /// Wrap row-major weights
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Shape`] if `data.len() != rows * cols`.
    pub fn new(data: Vec<f32>, rows: usize, cols: usize) -> VizResult<Self> {
        if data.len() != rows * cols {
            return Err(VizError::Shape(format!(
                "attention buffer has {} values, expected {rows} x {cols}",
                data.len()
            )));
        }
        Ok(Self { data, rows, cols })
    }

    /// Build from equally sized rows
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Shape`] if row lengths differ.
    pub fn from_rows(rows: &[Vec<f32>]) -> VizResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(VizError::Shape("attention rows have different lengths".into()));
        }
        Self::new(rows.concat(), rows.len(), cols)
    }

    /// Output steps
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Input steps
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Whether the matrix has no cells
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Weights of one output step
    #[must_use]
    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    /// Weight at `(row, col)`
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        (row < self.rows && col < self.cols).then(|| self.data[row * self.cols + col])
    }

    /// Largest weight, or 0 for an empty matrix
    #[must_use]
    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(0.0_f32, f32::max)
    }

    /// Top-left `rows × cols` block
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Shape`] if the block exceeds the matrix.
    pub fn slice(&self, rows: usize, cols: usize) -> VizResult<Self> {
        if rows > self.rows || cols > self.cols {
            return Err(VizError::Shape(format!(
                "cannot take {rows} x {cols} from a {} x {} attention matrix",
                self.rows, self.cols
            )));
        }
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            data.extend_from_slice(&self.row(r)[..cols]);
        }
        Ok(Self { data, rows, cols })
    }
}

/// Decoding parameters for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Beam width (1 = greedy)
    pub beam_width: usize,
    /// Step limit when EOS is never emitted
    pub max_decode_length: usize,
}

impl DecodeOptions {
    /// Whether decoding is greedy
    #[must_use]
    pub const fn is_greedy(&self) -> bool {
        self.beam_width <= 1
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            beam_width: 1,
            max_decode_length: 600,
        }
    }
}

/// Prediction and alignment for one utterance
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    /// Predicted label indices (may include EOS and padding)
    pub labels: Vec<i64>,
    /// `(decode steps × padded input frames)` weights
    pub attention: AttentionMatrix,
}

/// A trained attention-based sequence model
pub trait AttentionModel {
    /// Architecture of this model
    fn model_type(&self) -> ModelType;

    /// Bind the model to an execution device
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Model`] if the device is unavailable.
    fn set_device(&mut self, device: &ExecutionDevice) -> VizResult<()>;

    /// Replace parameters with restored values
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Restore`] if names or shapes do not match.
    fn load_state_dict(&mut self, state: &StateDict) -> VizResult<()>;

    /// Switch to inference mode (no dropout, no parameter updates)
    fn eval(&mut self);

    /// Whether the model is in training mode
    fn is_training(&self) -> bool;

    /// Decode a batch, returning one result per utterance in batch order
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Model`] if inference fails.
    fn attention_weights(&self, batch: &Batch, options: &DecodeOptions)
        -> VizResult<Vec<DecodeResult>>;
}

/// Inputs available to a model constructor
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec<'a> {
    /// Architecture to build
    pub model_type: ModelType,
    /// Training-time parameters
    pub params: &'a TrainParams,
    /// Output classes excluding SOS/EOS
    pub num_classes: usize,
}

/// Builds a model from its spec
pub type ModelConstructor =
    Box<dyn Fn(&ModelSpec<'_>) -> VizResult<Box<dyn AttentionModel>> + Send + Sync>;

/// Constructors keyed by architecture
#[derive(Default)]
pub struct ModelRegistry {
    constructors: HashMap<ModelType, ModelConstructor>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.constructors.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("ModelRegistry")
            .field("model_types", &types)
            .finish()
    }
}

impl ModelRegistry {
    /// Registry with no architectures
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for an architecture
    pub fn register<F>(&mut self, model_type: ModelType, constructor: F)
    where
        F: Fn(&ModelSpec<'_>) -> VizResult<Box<dyn AttentionModel>> + Send + Sync + 'static,
    {
        self.constructors.insert(model_type, Box::new(constructor));
    }

    /// Whether an architecture has a constructor
    #[must_use]
    pub fn contains(&self, model_type: ModelType) -> bool {
        self.constructors.contains_key(&model_type)
    }

    /// Construct an untrained model
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] if no constructor is registered, or whatever the
    /// constructor returns.
    pub fn build(&self, spec: &ModelSpec<'_>) -> VizResult<Box<dyn AttentionModel>> {
        let constructor = self.constructors.get(&spec.model_type).ok_or_else(|| {
            VizError::Config(format!(
                "no model implementation registered for model_type '{}'",
                spec.model_type
            ))
        })?;
        constructor(spec)
    }
}

/// A model ready for inference plus the checkpoint it came from
pub struct LoadedModel {
    /// The restored model, in inference mode
    pub model: Box<dyn AttentionModel>,
    /// Bookkeeping of the restored checkpoint
    pub checkpoint: CheckpointInfo,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model_type", &self.model.model_type())
            .field("checkpoint", &self.checkpoint)
            .finish()
    }
}

/// Build, bind, restore, and switch a model to inference mode
///
/// # Errors
///
/// Returns [`VizError::Config`] if the architecture has no attention or no
/// registered constructor, and [`VizError::Restore`] if the checkpoint is
/// missing or does not fit the model.
pub fn load_model(config: &ResolvedConfig, registry: &ModelRegistry) -> VizResult<LoadedModel> {
    let _guard = crate::trace_enter!("model.load", model_type = config.model_type.as_str());

    if !config.model_type.has_attention() {
        return Err(VizError::Config(format!(
            "model_type '{}' has no attention weights to plot",
            config.model_type
        )));
    }

    let spec = ModelSpec {
        model_type: config.model_type,
        params: &config.params,
        num_classes: config.num_classes,
    };
    let mut model = registry.build(&spec)?;

    let device = ExecutionDevice::for_inference(config.run.device);
    model.set_device(&device)?;
    tracing::info!(device = %device.kind, "model bound to device");

    let checkpoint = Checkpoint::load(&config.run.model_path, config.run.epoch)?;
    model.load_state_dict(&checkpoint.state_dict)?;
    tracing::info!(
        path = %checkpoint.path.display(),
        epoch = checkpoint.info.epoch,
        tensors = checkpoint.state_dict.len(),
        parameters = checkpoint.state_dict.num_parameters(),
        "restored checkpoint"
    );

    model.eval();

    Ok(LoadedModel {
        model,
        checkpoint: checkpoint.info,
    })
}
