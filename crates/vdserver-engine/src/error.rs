//! Engine error types.

use std::path::PathBuf;
use thiserror::Error;
use vdserver_parser::CodeLocation;

/// Errors raised by analysis queries and import indexing.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The file is not known to the session.
    #[error("module not found: {0}")]
    ModuleNotFound(String),
    /// The query's cancellation token was signalled.
    #[error("query cancelled")]
    Cancelled,
    /// Nothing resolvable at the requested position.
    #[error("no symbol found at {0}")]
    SymbolNotFound(CodeLocation),
    /// A file or directory could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The path being read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
