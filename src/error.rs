//! Error types for the message bus.

use thiserror::Error;

/// Main error type for bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No worker pool configured for background delivery")]
    NoWorkerPool,

    #[error("No designated executor configured for designated-thread delivery")]
    NoDesignatedExecutor,

    #[error("Message bus has been shut down")]
    ShutDown,

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
