//! Agent and executor roles, spoken over stdin/stdout

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hy_agent::{Agent, AgentOptions, CommandRunner, Executor, ProcessExecutorLauncher};
use hy_core::Transport;

/// Run an agent whose coordinator is on the other end of stdio
pub async fn agent_role(executors: usize, command: &str, heartbeat: Duration) -> Result<()> {
    tracing::info!("Agent starting with {} executors", executors);

    let launcher = ProcessExecutorLauncher::current(command)
        .context("Failed to locate the hydra executable")?;
    let options = AgentOptions {
        executors,
        heartbeat_interval: heartbeat,
        ..AgentOptions::default()
    };

    Agent::new(Transport::stdio(), Arc::new(launcher), options)
        .run()
        .await
        .context("Agent failed")?;

    tracing::info!("Agent stopped");
    Ok(())
}

/// Run an executor whose agent is on the other end of stdio
pub async fn executor_role(command: &str) -> Result<()> {
    let runner = CommandRunner::new(command);
    let ran = Executor::new(Transport::stdio(), Arc::new(runner))
        .run()
        .await
        .context("Executor link failed")?;

    tracing::debug!("Executor stopped after {} items", ran);
    Ok(())
}
