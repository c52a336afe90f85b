//! Launcher traits and the connection records they produce
//!
//! The coordinator boots agents and each agent boots executors through
//! these traits, so the same dispatch code runs against child processes,
//! ssh links, or in-process tasks.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;

use crate::config::AgentSpec;
use crate::error::HydraError;
use crate::transport::Transport;

/// Where the peer of a connection runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Child process on this machine
    Local,
    /// Process on another machine, reached over ssh
    Remote,
    /// Task inside the current process
    InProcess,
}

impl std::fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionKind::Local => write!(f, "local"),
            ConnectionKind::Remote => write!(f, "remote"),
            ConnectionKind::InProcess => write!(f, "in-process"),
        }
    }
}

/// A freshly launched peer
#[derive(Debug)]
pub struct Connection {
    /// Message link to the peer
    pub transport: Transport,
    /// Process to reap on teardown. For remote peers this is the ssh client.
    pub child: Option<Child>,
    /// Where the peer runs
    pub kind: ConnectionKind,
}

impl Connection {
    /// A peer backed by a child process
    pub fn process(transport: Transport, child: Child, kind: ConnectionKind) -> Self {
        Self {
            transport,
            child: Some(child),
            kind,
        }
    }

    /// A peer running as a task in this process
    pub fn in_process(transport: Transport) -> Self {
        Self {
            transport,
            child: None,
            kind: ConnectionKind::InProcess,
        }
    }
}

/// Wait up to `grace` for a child to exit, then kill it
pub async fn reap(child: &mut Child, grace: Duration) {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!("Child exited with {}", status),
        Ok(Err(e)) => tracing::warn!("Failed to wait for child: {}", e),
        Err(_) => {
            tracing::warn!("Child did not exit within {:?}, killing it", grace);
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill child: {}", e);
            }
        }
    }
}

/// Boots agents for the coordinator
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    /// Start the agent described by `spec` and return a link to it
    async fn launch(&self, spec: &AgentSpec) -> Result<Connection, HydraError>;
}

/// Boots executors for an agent
#[async_trait]
pub trait ExecutorLauncher: Send + Sync {
    /// Start executor number `index` and return a link to it
    async fn launch(&self, index: usize) -> Result<Connection, HydraError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[tokio::test]
    async fn test_reap_waits_for_exit() {
        let mut child = tokio::process::Command::new("true")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        reap(&mut child, Duration::from_secs(5)).await;
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reap_kills_after_grace() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        reap(&mut child, Duration::from_millis(50)).await;
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ConnectionKind::Remote.to_string(), "remote");
        assert_eq!(ConnectionKind::InProcess.to_string(), "in-process");
    }
}
