//! Agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Program started on a remote host to act as an agent
pub const DEFAULT_REMOTE_COMMAND: &str = "hydra";

/// How an agent is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Child process on this machine
    #[default]
    Local,
    /// Process started over `ssh` on another machine
    #[serde(alias = "remote")]
    Ssh,
}

/// One configured agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSpec {
    /// Transport used to reach the agent
    #[serde(rename = "type")]
    pub kind: AgentKind,

    /// Number of executors the agent boots
    pub executors: usize,

    /// ssh destination, e.g. `ci@build-2`
    pub connect: Option<String>,

    /// Extra options passed to ssh, split on whitespace
    pub ssh_opts: Option<String>,

    /// Working directory on the remote host
    pub directory: Option<PathBuf>,

    /// Command used to start hydra on the remote host
    pub remote_command: String,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            kind: AgentKind::Local,
            executors: 1,
            connect: None,
            ssh_opts: None,
            directory: None,
            remote_command: DEFAULT_REMOTE_COMMAND.to_string(),
        }
    }
}

impl AgentSpec {
    /// A local agent with `executors` executors
    pub fn local(executors: usize) -> Self {
        Self {
            executors,
            ..Self::default()
        }
    }

    /// A remote agent reached over ssh
    pub fn ssh(connect: impl Into<String>, directory: impl Into<PathBuf>, executors: usize) -> Self {
        Self {
            kind: AgentKind::Ssh,
            executors,
            connect: Some(connect.into()),
            directory: Some(directory.into()),
            ..Self::default()
        }
    }

    /// Whether this agent runs on another machine
    pub fn is_remote(&self) -> bool {
        self.kind == AgentKind::Ssh
    }

    /// Short human-readable name for logs and output
    pub fn label(&self) -> String {
        match (&self.kind, &self.connect) {
            (AgentKind::Ssh, Some(connect)) => connect.clone(),
            (AgentKind::Ssh, None) => "ssh".to_string(),
            (AgentKind::Local, _) => "local".to_string(),
        }
    }

    /// Split `ssh_opts` into arguments
    pub fn ssh_args(&self) -> Vec<String> {
        self.ssh_opts
            .as_deref()
            .map(|opts| opts.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Check that the fields required by `kind` are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executors == 0 {
            return Err(ConfigError::Invalid(format!(
                "agent {} must run at least one executor",
                self.label()
            )));
        }

        if self.is_remote() {
            if self.connect.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingField("connect".to_string()));
            }
            if self.directory.is_none() {
                return Err(ConfigError::MissingField("directory".to_string()));
            }
        }

        Ok(())
    }
}

/// Source tree mirrored to remote agents before they boot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSpec {
    /// Local directory to mirror
    pub directory: PathBuf,

    /// rsync exclude patterns
    pub exclude: Vec<String>,
}
