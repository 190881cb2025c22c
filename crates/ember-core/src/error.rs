//! Error types for the engine.

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A fixed-capacity table ran out of slots
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A handle did not refer to a live resource
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
