//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding or validating a frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Non-finite aim coordinate")]
    NonFiniteAim,

    #[error("Name is empty")]
    EmptyName,

    #[error("Name exceeds {max} characters")]
    NameTooLong { max: usize },

    #[error("Room duration must be between 1 and {max} seconds, got {got}")]
    InvalidDuration { got: u64, max: u64 },
}
