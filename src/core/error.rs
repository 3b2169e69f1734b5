//! Error types for farsight

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("World access error: {0}")]
    World(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] farsight_protocol::ProtocolError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Outcome of a failed generation, shared by every waiter of that build
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("chunk ({chunk_x}, {chunk_z}) could not be loaded")]
    ChunkLoadRejected { chunk_x: i32, chunk_z: i32 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Error> for GenerationError {
    fn from(e: Error) -> Self {
        match e {
            Error::Generation(inner) => inner,
            other => GenerationError::Internal(other.to_string()),
        }
    }
}
