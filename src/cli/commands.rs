//! Command implementation for attnviz-cli
//!
//! Argument conversion and validation are pure functions for testability.
//! `run` resolves the configuration and hands it to the visualization driver.

use std::time::Instant;

use crate::config::{ResolvedConfig, RunOptions};
use crate::dataset::DataType;
use crate::model::{DeviceKind, EpochSelector, ModelRegistry};
use crate::visualize::{run_pipeline, VisualizationSummary};

use super::args::{Args, DataTypeArg, DeviceArg};

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Visualization error
    #[error("{0}")]
    Viz(#[from] crate::VizError),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

/// Command execution result
#[derive(Debug)]
pub struct CommandResult {
    /// Output message
    pub message: String,
    /// Counts from the visualization pass
    pub summary: Option<VisualizationSummary>,
    /// Wall-clock time in milliseconds
    pub elapsed_ms: Option<f64>,
}

impl CommandResult {
    /// Create a result carrying only a message
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            summary: None,
            elapsed_ms: None,
        }
    }

    /// Attach the pass summary
    #[must_use]
    pub fn with_summary(mut self, summary: VisualizationSummary) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Attach the elapsed time
    #[must_use]
    pub fn with_elapsed_ms(mut self, elapsed_ms: f64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }
}

/// Run CLI with parsed arguments
///
/// This is the main entry point called by the binary. No architectures are
/// registered here; embedders call [`run_with_registry`] with their own.
pub fn run(args: Args) -> CliResult<CommandResult> {
    run_with_registry(args, &ModelRegistry::new())
}

/// Run CLI with the given model constructors
pub fn run_with_registry(args: Args, registry: &ModelRegistry) -> CliResult<CommandResult> {
    let start = Instant::now();
    let run_options = convert_args(&args)?;
    if !run_options.model_path.is_dir() {
        return Err(CliError::FileNotFound(
            run_options.model_path.display().to_string(),
        ));
    }

    let config = ResolvedConfig::resolve(run_options)?;
    tracing::info!(
        model_path = %config.run.model_path.display(),
        model_type = %config.model_type,
        label_type = %config.params.label_type,
        data_size = %config.params.data_size,
        num_classes = config.num_classes,
        device = %config.run.device,
        "resolved configuration"
    );

    let summary = run_pipeline(&config, registry, !args.quiet)?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let message = format!(
        "{} attention plots written to {} ({} skipped)",
        summary.rendered,
        config.output_dir().display(),
        summary.skipped
    );
    if !args.quiet {
        println!("{message}");
    }
    Ok(CommandResult::new(message)
        .with_summary(summary)
        .with_elapsed_ms(elapsed_ms))
}

/// Validate arguments and convert them to run options
///
/// # Errors
///
/// Returns [`CliError::InvalidArgument`] for a zero batch size, beam width or
/// decode length, and for an epoch below `-1`.
pub fn convert_args(args: &Args) -> CliResult<RunOptions> {
    if args.eval_batch_size == 0 {
        return Err(CliError::InvalidArgument(
            "--eval_batch_size must be at least 1".into(),
        ));
    }
    if args.beam_width == 0 {
        return Err(CliError::InvalidArgument("--beam_width must be at least 1".into()));
    }
    if args.max_decode_length == 0 {
        return Err(CliError::InvalidArgument(
            "--max_decode_length must be at least 1".into(),
        ));
    }
    let epoch = EpochSelector::from_cli(args.epoch).map_err(|_| {
        CliError::InvalidArgument(format!(
            "--epoch must be -1 (latest) or a non-negative epoch, got {}",
            args.epoch
        ))
    })?;

    Ok(RunOptions {
        model_path: args.model_path.clone(),
        epoch,
        eval_batch_size: args.eval_batch_size,
        beam_width: args.beam_width,
        max_decode_length: args.max_decode_length,
        metrics_dir: args.metrics_dir.clone(),
        dataset_dir: args.dataset_dir.clone(),
        data_type: convert_data_type_arg(args.data_type),
        device: convert_device_arg(args.device, args.gpu_index),
        preview: args.preview,
    })
}

fn convert_data_type_arg(arg: DataTypeArg) -> DataType {
    match arg {
        DataTypeArg::TestClean => DataType::TestClean,
        DataTypeArg::TestOther => DataType::TestOther,
    }
}

fn convert_device_arg(arg: DeviceArg, gpu_index: usize) -> DeviceKind {
    match arg {
        DeviceArg::Cpu => DeviceKind::Cpu,
        DeviceArg::Gpu => DeviceKind::Gpu(gpu_index),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
