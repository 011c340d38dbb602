//! Command-line argument parsing for attnviz-cli
//!
//! Uses clap derive macros for type-safe argument parsing.
//! Flag names keep the snake_case spellings of the training scripts.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// attnviz: plot decoder attention over input frames for a trained model
#[derive(Parser, Debug, Clone)]
#[command(name = "attnviz-cli")]
#[command(version)]
#[command(about = "Visualize attention weights of a trained speech recognizer", long_about = None)]
#[command(after_help = "Model architectures are not built into this binary. They plug in only \
through attnviz::cli::run_with_registry; run as shipped, every model_type is reported as \
unregistered.")]
pub struct Args {
    /// Directory of the trained model (config.yml and checkpoints)
    #[arg(long = "model_path")]
    pub model_path: PathBuf,

    /// Epoch of the checkpoint to restore (-1 = latest)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub epoch: i64,

    /// Utterances per batch
    #[arg(long = "eval_batch_size", default_value_t = 1)]
    pub eval_batch_size: usize,

    /// Beam width (1 = greedy decoding)
    #[arg(long = "beam_width", default_value_t = 1)]
    pub beam_width: usize,

    /// Maximum decode steps when no end-of-sequence is emitted
    #[arg(long = "max_decode_length", default_value_t = 600)]
    pub max_decode_length: usize,

    /// Directory holding vocab_num.yml and vocab_files/
    #[arg(long = "metrics_dir", default_value = "../metrics")]
    pub metrics_dir: PathBuf,

    /// Root of the corpus index and feature files
    #[arg(long = "dataset_dir", default_value = "../dataset")]
    pub dataset_dir: PathBuf,

    /// Test partition to visualize
    #[arg(long = "data_type", value_enum, default_value_t = DataTypeArg::TestClean)]
    pub data_type: DataTypeArg,

    /// Execution device
    #[arg(long, value_enum, default_value_t = DeviceArg::Gpu)]
    pub device: DeviceArg,

    /// GPU ordinal when --device gpu
    #[arg(long = "gpu_index", default_value_t = 0)]
    pub gpu_index: usize,

    /// Log an ASCII heatmap of every plot (debug level)
    #[arg(long)]
    pub preview: bool,

    /// Verbose output (debug logging)
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet mode (warnings only, no progress bar)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Default log filter for the selected verbosity
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

/// Test partitions
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTypeArg {
    /// LibriSpeech test-clean
    #[value(name = "test_clean")]
    TestClean,
    /// LibriSpeech test-other
    #[value(name = "test_other")]
    TestOther,
}

/// Execution devices
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceArg {
    /// Host CPU
    Cpu,
    /// GPU selected by --gpu_index
    Gpu,
}
