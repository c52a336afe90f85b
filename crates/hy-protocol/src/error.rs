//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A message could not be turned into a wire record
    #[error("Unprocessable message: {0}")]
    UnprocessableMessage(String),

    /// A line is not a protocol record
    #[error("Not a protocol record: {0}")]
    NotAMessage(String),

    /// Record carries a protocol version we do not speak
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
