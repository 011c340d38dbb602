//! Error types for attnviz

use thiserror::Error;

/// Result type alias for attnviz operations
pub type VizResult<T> = Result<T, VizError>;

/// Errors that can occur while visualizing attention weights
#[derive(Debug, Error)]
pub enum VizError {
    /// Missing or malformed config / vocab-size artifacts
    #[error("config error: {0}")]
    Config(String),

    /// Vocabulary file or label mapping error
    #[error("vocabulary error: {0}")]
    Vocabulary(String),

    /// Corpus index or feature file error
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Checkpoint discovery or restore error
    #[error("restore error: {0}")]
    Restore(String),

    /// Attention matrix does not cover the requested slice
    #[error("shape error: {0}")]
    Shape(String),

    /// Image rendering or encoding error
    #[error("render error: {0}")]
    Render(String),

    /// Error raised by a model implementation
    #[error("model error: {0}")]
    Model(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
