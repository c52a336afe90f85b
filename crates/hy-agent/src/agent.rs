//! Agent: relays work between the coordinator and local executors
//!
//! # Tasks
//!
//! - one listener per executor, relaying its requests and results upward.
//!   Listeners start after `AgentReady`, so it is always the first message.
//! - the coordinator listener (the agent's own loop), handing each
//!   assigned item to an idle executor
//! - a heartbeat task
//!
//! All of them share one cancellation token. It fires on `Shutdown`, when
//! the coordinator link breaks, or when every executor is gone.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use hy_core::launch::reap;
use hy_core::{ExecutorLauncher, HydraError, MessageReceiver, MessageSender, Transport};
use hy_protocol::{Message, WorkItem};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::health::HeartbeatMonitor;
use crate::pool::ExecutorPool;

/// Settings of one agent
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Number of executors to boot
    pub executors: usize,
    /// Interval between heartbeats to the coordinator
    pub heartbeat_interval: Duration,
    /// How long executors get to exit after shutdown
    pub reap_grace: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            executors: 1,
            heartbeat_interval: Duration::from_secs(5),
            reap_grace: Duration::from_secs(5),
        }
    }
}

impl AgentOptions {
    /// Options for `executors` executors with default timings
    pub fn with_executors(executors: usize) -> Self {
        Self {
            executors,
            ..Self::default()
        }
    }
}

/// Manages the executors of one machine
pub struct Agent {
    upstream: Transport,
    launcher: Arc<dyn ExecutorLauncher>,
    options: AgentOptions,
}

impl Agent {
    /// Create an agent talking to the coordinator over `upstream`
    pub fn new(
        upstream: Transport,
        launcher: Arc<dyn ExecutorLauncher>,
        options: AgentOptions,
    ) -> Self {
        Self {
            upstream,
            launcher,
            options,
        }
    }

    /// Boot the executors and relay work until shut down.
    ///
    /// Fails only if no executor could be booted.
    pub async fn run(self) -> Result<(), HydraError> {
        let Agent {
            upstream,
            launcher,
            options,
        } = self;
        let (upstream_tx, mut upstream_rx) = upstream.split();

        let pool = Arc::new(ExecutorPool::new());
        let cancel = CancellationToken::new();
        let mut children: Vec<Child> = Vec::new();
        let mut receivers: Vec<(usize, MessageReceiver)> = Vec::new();

        for index in 0..options.executors {
            let connection = match launcher.launch(index).await {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::warn!("Failed to boot executor {}: {}", index, e);
                    continue;
                }
            };

            let (sender, receiver) = connection.transport.split();
            pool.insert(index, sender);
            receivers.push((index, receiver));
            if let Some(child) = connection.child {
                children.push(child);
            }
        }

        if pool.is_empty() {
            let _ = upstream_tx.close().await;
            return Err(HydraError::Launch(format!(
                "none of {} executors could be booted",
                options.executors
            )));
        }

        let booted = pool.len();
        tracing::info!("Booted {} executors", booted);

        // Executor requests queue up on their links until the relays start
        if let Err(e) = upstream_tx.send(Message::AgentReady { executors: booted }).await {
            tracing::warn!("Coordinator went away during boot: {}", e);
            cancel.cancel();
        }

        let listeners: Vec<JoinHandle<()>> = receivers
            .into_iter()
            .map(|(index, receiver)| {
                tokio::spawn(relay_executor(
                    index,
                    receiver,
                    Arc::clone(&pool),
                    upstream_tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        let heartbeat = HeartbeatMonitor::new(options.heartbeat_interval)
            .spawn_monitor(upstream_tx.clone(), cancel.clone());

        listen_coordinator(&mut upstream_rx, &pool, &cancel).await;
        cancel.cancel();

        tracing::debug!("Stopping {} executors", pool.len());
        for (index, sender) in pool.senders() {
            if sender.send(Message::Shutdown).await.is_err() {
                tracing::debug!("Executor {} already gone", index);
            }
            let _ = sender.close().await;
        }

        let _ = heartbeat.await;
        for listener in listeners {
            let _ = listener.await;
        }

        let grace = options.reap_grace;
        join_all(children.iter_mut().map(|child| reap(child, grace))).await;

        let _ = upstream_tx.close().await;
        tracing::info!("Agent stopped");
        Ok(())
    }
}

/// Hand assigned items to idle executors until told to stop
async fn listen_coordinator(
    upstream_rx: &mut MessageReceiver,
    pool: &ExecutorPool,
    cancel: &CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return,
            message = upstream_rx.receive() => message,
        };

        match message {
            Ok(Some(Message::AssignWork { item })) => {
                if !assign(item, pool, cancel).await {
                    return;
                }
            }
            Ok(Some(Message::Shutdown)) => {
                tracing::info!("Coordinator requested shutdown");
                return;
            }
            Ok(Some(Message::Heartbeat)) => {}
            Ok(Some(other)) => {
                tracing::trace!("Ignoring {} from coordinator", other.message_type());
            }
            Ok(None) => {
                tracing::warn!("Coordinator closed the link");
                return;
            }
            Err(e) => {
                tracing::warn!("Link to coordinator failed: {}", e);
                return;
            }
        }
    }
}

/// Forward `item` to the next idle executor. Returns false if the agent
/// has to stop.
async fn assign(item: WorkItem, pool: &ExecutorPool, cancel: &CancellationToken) -> bool {
    loop {
        let acquired = tokio::select! {
            _ = cancel.cancelled() => return false,
            acquired = pool.acquire(&item) => acquired,
        };

        let Some((index, sender)) = acquired else {
            tracing::error!("All executors are gone, cannot run {}", item);
            return false;
        };

        match sender.send(Message::AssignWork { item: item.clone() }).await {
            Ok(()) => {
                tracing::debug!("Assigned {} to executor {}", item, index);
                return true;
            }
            Err(e) => {
                tracing::warn!("Executor {} unreachable: {}", index, e);
                pool.remove(index);
            }
        }
    }
}

/// Relay one executor's requests and results to the coordinator
async fn relay_executor(
    index: usize,
    mut receiver: MessageReceiver,
    pool: Arc<ExecutorPool>,
    upstream: MessageSender,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return,
            message = receiver.receive() => message,
        };

        match message {
            Ok(Some(message @ (Message::RequestWork | Message::WorkResult { .. }))) => {
                pool.mark_idle(index);
                if let Err(e) = upstream.send(message).await {
                    tracing::warn!("Cannot reach coordinator: {}", e);
                    cancel.cancel();
                    return;
                }
            }
            Ok(Some(Message::Heartbeat)) => {}
            Ok(Some(other)) => {
                tracing::trace!("Ignoring {} from executor {}", other.message_type(), index);
            }
            Ok(None) => {
                tracing::warn!("Executor {} closed its link", index);
                break;
            }
            Err(e) => {
                tracing::warn!("Link to executor {} failed: {}", index, e);
                break;
            }
        }
    }

    // Report the in-flight item so the coordinator does not wait on it
    if let Some(item) = pool.remove(index) {
        let output = format!("Executor {} exited while running {}", index, item);
        if upstream.send(Message::ExecutorLost { item, output }).await.is_err() {
            cancel.cancel();
        }
    }

    if pool.is_empty() {
        tracing::error!("No executors left");
        cancel.cancel();
    }
}
