//! Broker error types.

use thiserror::Error;

/// Errors returned by synchronous broker operations.
///
/// Background query failures never surface here; they are reported through
/// the `__cancelled__` sentinel of the corresponding result call.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The file has not been sent with `updateModule` in this session.
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// The operation exists on the interface but has no implementation.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// The worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl BrokerError {
    /// Error code reported over the line transport.
    ///
    /// `1` is the code editors already expect for a missing module.
    pub const fn code(&self) -> i64 {
        match self {
            Self::ModuleNotFound(_) => 1,
            Self::NotImplemented(_) | Self::WorkerPool(_) => crate::protocol::INTERNAL_ERROR,
        }
    }
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
