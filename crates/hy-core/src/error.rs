//! Core error types for hydra

use hy_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the hydra ecosystem
#[derive(Error, Debug)]
pub enum HydraError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Source synchronization error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// A peer process could not be started
    #[error("Launch failed: {0}")]
    Launch(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors on a single link between two tiers
#[derive(Error, Debug)]
pub enum TransportError {
    /// The other side closed the connection
    #[error("Other side closed the connection")]
    ChannelBroken,

    /// The transport was built from a child whose stdio is not piped
    #[error("Child process stdio is not piped; cannot identify transport ends")]
    Unidentified,

    /// A message could not be encoded as a protocol record
    #[error("Unprocessable message: {0}")]
    UnprocessableMessage(String),

    /// I/O error while setting up the link
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnprocessableMessage(msg) => TransportError::UnprocessableMessage(msg),
            ProtocolError::Io(_) => TransportError::ChannelBroken,
            other => TransportError::UnprocessableMessage(other.to_string()),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Errors while mirroring the source tree to a remote agent
#[derive(Error, Debug)]
pub enum SyncError {
    /// rsync could not be started
    #[error("Failed to start rsync for {target}: {source}")]
    Spawn {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// rsync exited unsuccessfully
    #[error("rsync to {target} exited with {status}: {output}")]
    Failed {
        target: String,
        status: String,
        output: String,
    },

    /// The agent or sync settings lack something rsync needs
    #[error("Cannot sync {0}")]
    Incomplete(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_io_error_is_broken_channel() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: TransportError = ProtocolError::Io(io).into();
        assert!(matches!(err, TransportError::ChannelBroken));
    }

    #[test]
    fn test_unprocessable_is_not_broken() {
        let err: TransportError = ProtocolError::UnprocessableMessage("bad".into()).into();
        assert!(matches!(err, TransportError::UnprocessableMessage(_)));
        assert!(err.to_string().contains("bad"));
    }
}
