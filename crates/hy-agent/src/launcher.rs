//! Executor and agent launchers
//!
//! Process launchers start `hydra executor` children that speak the
//! protocol over their stdio. In-process launchers run the same loops as
//! tasks over in-memory pairs.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hy_core::config::AgentSpec;
use hy_core::transport::pair;
use hy_core::{
    AgentLauncher, Connection, ConnectionKind, ExecutorLauncher, HydraError, Transport,
};
use tokio::process::Command;

use crate::agent::{Agent, AgentOptions};
use crate::executor::Executor;
use crate::runner::WorkRunner;

/// Starts executors as child processes of the agent
#[derive(Debug, Clone)]
pub struct ProcessExecutorLauncher {
    program: PathBuf,
    command: String,
}

impl ProcessExecutorLauncher {
    /// Launch `program executor --command <command>`
    pub fn new(program: impl Into<PathBuf>, command: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            command: command.into(),
        }
    }

    /// Launch executors from the currently running binary
    pub fn current(command: impl Into<String>) -> Result<Self, HydraError> {
        Ok(Self::new(std::env::current_exe()?, command))
    }

    /// The command line used for executor `index`, for logs
    fn describe(&self, index: usize) -> String {
        format!(
            "{} executor --command {:?} (#{})",
            self.program.display(),
            self.command,
            index
        )
    }
}

#[async_trait]
impl ExecutorLauncher for ProcessExecutorLauncher {
    async fn launch(&self, index: usize) -> Result<Connection, HydraError> {
        tracing::debug!("Launching {}", self.describe(index));

        let mut child = Command::new(&self.program)
            .arg("executor")
            .arg("--command")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HydraError::Launch(format!("{}: {}", self.describe(index), e)))?;

        let transport = Transport::from_child(&mut child)?;
        Ok(Connection::process(transport, child, ConnectionKind::Local))
    }
}

/// Runs executors as tasks in the agent's process
#[derive(Clone)]
pub struct InProcessExecutorLauncher {
    runner: Arc<dyn WorkRunner>,
}

impl InProcessExecutorLauncher {
    /// Executors that run items with `runner`
    pub fn new(runner: Arc<dyn WorkRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ExecutorLauncher for InProcessExecutorLauncher {
    async fn launch(&self, index: usize) -> Result<Connection, HydraError> {
        let (ours, theirs) = pair();
        let executor = Executor::new(theirs, Arc::clone(&self.runner));

        tokio::spawn(async move {
            match executor.run().await {
                Ok(completed) => tracing::debug!("Executor {} ran {} items", index, completed),
                Err(e) => tracing::warn!("Executor {} failed: {}", index, e),
            }
        });

        Ok(Connection::in_process(ours))
    }
}

/// Runs whole agents, with in-process executors, as tasks in the
/// coordinator's process
#[derive(Clone)]
pub struct InProcessAgentLauncher {
    runner: Arc<dyn WorkRunner>,
    heartbeat_interval: Duration,
}

impl InProcessAgentLauncher {
    /// Agents whose executors run items with `runner`
    pub fn new(runner: Arc<dyn WorkRunner>) -> Self {
        Self {
            runner,
            heartbeat_interval: AgentOptions::default().heartbeat_interval,
        }
    }

    /// Set the heartbeat interval of launched agents
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

#[async_trait]
impl AgentLauncher for InProcessAgentLauncher {
    async fn launch(&self, spec: &AgentSpec) -> Result<Connection, HydraError> {
        let (ours, theirs) = pair();
        let launcher = Arc::new(InProcessExecutorLauncher::new(Arc::clone(&self.runner)));
        let options = AgentOptions {
            executors: spec.executors,
            heartbeat_interval: self.heartbeat_interval,
            ..AgentOptions::default()
        };
        let label = spec.label();

        tokio::spawn(async move {
            if let Err(e) = Agent::new(theirs, launcher, options).run().await {
                tracing::warn!("Agent {} failed: {}", label, e);
            }
        });

        Ok(Connection::in_process(ours))
    }
}
