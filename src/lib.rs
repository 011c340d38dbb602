//! # attnviz
//!
//! Attention-weight visualization for trained attention-based speech recognizers.
//!
//! ## Overview
//!
//! Given a trained model directory, attnviz restores a checkpoint, decodes the
//! test partition of the corpus, and writes one heatmap per utterance showing
//! how each predicted output token attends over the input frames.
//!
//! ```text
//! config.yml ─┐
//! vocab_num.yml ─► ResolvedConfig ─► load_model ─► Visualizer ─► attention_weights/<spk>/<utt>.png
//! <type>.csv ─► Dataset ────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use attnviz::{run_pipeline, ModelRegistry, ModelType, ResolvedConfig, RunOptions};
//!
//! let mut registry = ModelRegistry::new();
//! registry.register(ModelType::Attention, |spec| Ok(Box::new(MyModel::new(spec)?)));
//!
//! let config = ResolvedConfig::resolve(RunOptions::new("models/attention/las"))?;
//! let summary = run_pipeline(&config, &registry, true)?;
//! println!("{} images", summary.rendered);
//! ```
//!
//! Model architectures are not built in; they plug in through
//! [`ModelRegistry`] by implementing [`AttentionModel`].

#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod model;
pub mod render;
pub mod tokenizer;
#[macro_use]
pub mod trace;
pub mod visualize;

/// Command-line interface
pub mod cli;

pub use config::{ResolvedConfig, RunOptions, TrainParams, VocabSizeTable};
pub use dataset::{Batch, DataType, Dataset, DatasetOptions, SaveFormat};
pub use error::{VizError, VizResult};
pub use model::{
    load_model, AttentionMatrix, AttentionModel, DecodeOptions, DecodeResult, DeviceKind,
    EpochSelector, ModelRegistry, ModelType,
};
pub use render::{AttentionPlot, FigureSize};
pub use tokenizer::{LabelKind, VocabularyMap};
pub use visualize::{run_pipeline, speaker_id, VisualizationSummary, Visualizer};
