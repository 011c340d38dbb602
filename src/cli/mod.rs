//! CLI module for attnviz
//!
//! All logic lives in this module for testability. The binary
//! (`src/bin/attnviz-cli.rs`) is a thin shell that only calls `cli::run()`.
//!
//! ```text
//! src/cli/
//! ├── mod.rs       # This file - module exports
//! ├── args.rs      # Argument parsing with clap
//! └── commands.rs  # Validation, conversion and the run entry point
//! ```

pub mod args;
pub mod commands;

pub use args::{Args, DataTypeArg, DeviceArg};
pub use commands::{convert_args, run, run_with_registry, CliError, CliResult, CommandResult};
