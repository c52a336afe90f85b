//! hy-core: Core abstractions and configuration for hydra
//!
//! This crate provides the error taxonomy, configuration structures,
//! message transports, and launcher traits shared by the coordinator,
//! agent, and CLI components.

pub mod config;
pub mod error;
pub mod launch;
pub mod time;
pub mod transport;

pub use error::{ConfigError, HydraError, SyncError, TransportError};
pub use launch::{AgentLauncher, Connection, ConnectionKind, ExecutorLauncher};
pub use transport::{MessageReceiver, MessageSender, Transport};
