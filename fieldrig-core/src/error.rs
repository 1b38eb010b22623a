//! Error types for fieldrig operations.

use thiserror::Error;

/// Result type alias using the crate Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or solving a simulation.
#[derive(Error, Debug)]
pub enum Error {
    /// A requested ID or segment is not registered.
    #[error("not found: {0}")]
    NotFound(String),

    /// Cross-references between fields, node arrays and element arrays are broken.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// The operation is not implemented for this field layout.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Malformed value expression.
    #[error("expression error: {0}")]
    Expression(String),

    /// Mesh-related errors.
    #[error("mesh error: {0}")]
    Mesh(String),

    /// Assembly errors.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Solver errors.
    #[error("solver error: {0}")]
    Solver(String),

    /// Matrix singularity or conditioning issues.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed exchange file.
    #[error("format error: {0}")]
    Format(String),

    /// I/O errors (export, configuration files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
