//! Error types shared by the retry path.

use std::io;
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::coordination::CoordinationError;

/// Why a single attempt failed.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The endpoint was replaced while the transfer was in flight.
    #[error("endpoint changed in the middle of the operation (started against {endpoint})")]
    EndpointChangedMidOperation { endpoint: String },

    /// Network or storage hiccup.
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] io::Error),
}

impl OperationError {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            OperationError::EndpointChangedMidOperation { .. } => "changed_mid_flight",
            OperationError::TransientIo(_) => "io_error",
        }
    }
}

/// Errors surfaced to callers of the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Every attempt for an object failed.
    #[error("could not complete {object} after {attempts} attempts")]
    AttemptsExhausted { object: String, attempts: u32 },

    /// The process is shutting down.
    #[error("{object}: cancelled by shutdown")]
    Cancelled { object: String },

    /// Coordination backend could not be set up.
    #[error("coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    /// Storage backend could not be set up.
    #[error("storage setup failed: {0}")]
    StorageSetup(io::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
