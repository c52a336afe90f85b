//! Booting agents as processes

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use hy_core::config::AgentSpec;
use hy_core::transport::ssh::{self, shell_quote};
use hy_core::{AgentLauncher, Connection, ConnectionKind, HydraError, Transport};
use tokio::process::Command;

/// Starts local agents as children and remote agents over ssh
#[derive(Debug, Clone)]
pub struct ProcessAgentLauncher {
    program: PathBuf,
    command: String,
    heartbeat_interval: Duration,
}

impl ProcessAgentLauncher {
    /// Launch `program agent ...` for local agents. `command` is the
    /// runner template passed on to executors.
    pub fn new(program: impl Into<PathBuf>, command: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            command: command.into(),
            heartbeat_interval: Duration::from_secs(5),
        }
    }

    /// Launch local agents from the currently running binary
    pub fn current(command: impl Into<String>) -> Result<Self, HydraError> {
        Ok(Self::new(std::env::current_exe()?, command))
    }

    /// Set the heartbeat interval passed to agents
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Arguments after the program name that start an agent
    fn agent_args(&self, spec: &AgentSpec) -> Vec<String> {
        vec![
            "agent".to_string(),
            "--executors".to_string(),
            spec.executors.to_string(),
            "--command".to_string(),
            self.command.clone(),
            "--heartbeat".to_string(),
            self.heartbeat_interval.as_secs().max(1).to_string(),
        ]
    }

    /// Shell line that starts an agent on a remote host
    pub fn remote_command_line(&self, spec: &AgentSpec) -> String {
        let mut line = spec.remote_command.clone();
        for arg in self.agent_args(spec) {
            line.push(' ');
            if arg.starts_with("--") || arg == "agent" {
                line.push_str(&arg);
            } else {
                line.push_str(&shell_quote(&arg));
            }
        }
        line
    }

    async fn launch_local(&self, spec: &AgentSpec) -> Result<Connection, HydraError> {
        let mut child = Command::new(&self.program)
            .args(self.agent_args(spec))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HydraError::Launch(format!("{}: {}", self.program.display(), e))
            })?;

        let transport = Transport::from_child(&mut child)?;
        Ok(Connection::process(transport, child, ConnectionKind::Local))
    }

    async fn launch_remote(&self, spec: &AgentSpec) -> Result<Connection, HydraError> {
        let connect = spec
            .connect
            .as_deref()
            .ok_or_else(|| HydraError::Launch("ssh agent without connect".to_string()))?;
        let directory = spec
            .directory
            .as_deref()
            .ok_or_else(|| HydraError::Launch(format!("{}: no remote directory", connect)))?;

        let line = self.remote_command_line(spec);
        let (transport, child) = ssh::connect(connect, &spec.ssh_args(), directory, &line).await?;
        Ok(Connection::process(transport, child, ConnectionKind::Remote))
    }
}

#[async_trait]
impl AgentLauncher for ProcessAgentLauncher {
    async fn launch(&self, spec: &AgentSpec) -> Result<Connection, HydraError> {
        tracing::debug!("Launching agent {} with {} executors", spec.label(), spec.executors);
        if spec.is_remote() {
            self.launch_remote(spec).await
        } else {
            self.launch_local(spec).await
        }
    }
}
