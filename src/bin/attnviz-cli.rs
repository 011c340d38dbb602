//! attnviz-cli: plot attention weights of a trained model
//!
//! This is a thin shell that delegates to library functions.
//! All logic lives in `attnviz::cli` for testability.

use attnviz::cli::{run, Args};
use clap::Parser;

fn main() {
    let args = Args::parse();
    init_tracing(args.log_level());

    match run(args) {
        Ok(result) => {
            tracing::debug!(summary = ?result.summary, elapsed_ms = ?result.elapsed_ms, "done");
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(default_level: &str) {
    use tracing_subscriber::prelude::*;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
