//! Coordinator run loop
//!
//! # Architecture
//!
//! ```text
//!   agent link 0 ──► listen_agent ──┐
//!   agent link 1 ──► listen_agent ──┼──► mpsc<AgentEvent> ──► Run (queue, records)
//!   ssh agent 2 ──► sync + boot ───┘                            │
//!                                                                └──► AssignWork / Shutdown
//! ```
//!
//! One task per agent link reads messages and forwards them as events.
//! The run loop is the only owner of the work queue and the agent records,
//! so dispatch decisions never race.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::future::join_all;
use hy_core::config::{AgentSpec, RunConfig, StrandedPolicy, SyncSpec};
use hy_core::launch::reap;
use hy_core::{AgentLauncher, Connection, ConnectionKind, MessageSender};
use hy_protocol::{Message, WorkItem};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::heuristic::DurationReport;
use crate::listener::Listener;
use crate::queue::WorkQueue;
use crate::retry::RetryPolicy;
use crate::summary::{ItemResult, Outcome, RunSummary};
use crate::sync::sync_agent;

/// Capacity of the channel from agent listeners to the run loop
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How long agents get to exit after shutdown
const REAP_GRACE: Duration = Duration::from_secs(10);

/// Index of an agent in the configuration
type AgentId = usize;

/// Event from an agent's listener task to the run loop
#[derive(Debug)]
enum AgentEvent {
    /// The agent sent its first message within the boot timeout
    Connected {
        id: AgentId,
        sender: MessageSender,
        child: Option<Child>,
        kind: ConnectionKind,
    },
    /// The agent could not be started
    BootFailed { id: AgentId, reason: String },
    /// A message from a connected agent
    Message { id: AgentId, message: Message },
    /// The link to a connected agent is gone
    Lost { id: AgentId, reason: String },
}

/// A connected agent as seen by the coordinator
struct AgentRecord {
    label: String,
    sender: MessageSender,
    child: Option<Child>,
    kind: ConnectionKind,
    /// Work requests not yet answered with an item
    outstanding: usize,
    /// Items handed out and not yet reported back, with dispatch time
    assigned: Vec<(WorkItem, Instant)>,
}

/// Runs a batch of work items across the configured agents
pub struct Coordinator {
    config: RunConfig,
    launcher: Arc<dyn AgentLauncher>,
    listeners: Vec<Box<dyn Listener>>,
}

impl Coordinator {
    /// Create a coordinator booting agents through `launcher`
    pub fn new(config: RunConfig, launcher: Arc<dyn AgentLauncher>) -> Self {
        Self {
            config,
            launcher,
            listeners: Vec::new(),
        }
    }

    /// Register a lifecycle listener
    pub fn with_listener(mut self, listener: impl Listener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Run every item once and collect the outcome.
    ///
    /// Agent failures never abort the run: items of a lost agent are
    /// requeued or abandoned, and if no agent is left the remaining items
    /// are reported as unknown.
    pub async fn run(self, items: Vec<WorkItem>) -> Result<RunSummary> {
        let Coordinator {
            config,
            launcher,
            listeners,
        } = self;

        config.validate().context("Invalid run configuration")?;
        let retry = RetryPolicy::new(&config.retry_patterns, config.max_retries)
            .context("Invalid retry patterns")?;

        let started = Instant::now();
        let mut items = items;
        if config.sort_by_duration {
            DurationReport::load(&config.heuristic_path()).sort_items(&mut items);
        }

        let mut run = Run {
            queue: WorkQueue::new(items.iter().cloned()),
            retry,
            stranded: config.stranded,
            labels: config.agents.iter().map(AgentSpec::label).enumerate().collect(),
            agents: BTreeMap::new(),
            booting: 0,
            summary: RunSummary::new(),
            listeners,
            finished: false,
        };

        run.notify(|l| l.testing_begin(&items));
        tracing::info!(
            "Running {} items on {} agents",
            items.len(),
            config.agents.len()
        );

        if run.queue.is_done() {
            run.finish().await;
        } else {
            let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let cancel = CancellationToken::new();
            run.booting = config.agents.len();

            for (id, spec) in config.agents.iter().enumerate() {
                if spec.is_remote() {
                    tokio::spawn(boot_remote(
                        id,
                        spec.clone(),
                        config.sync.clone(),
                        Arc::clone(&launcher),
                        config.boot_timeout,
                        events_tx.clone(),
                        cancel.clone(),
                    ));
                    continue;
                }

                match launcher.launch(spec).await {
                    Ok(connection) => {
                        tokio::spawn(listen_agent(
                            id,
                            connection,
                            config.boot_timeout,
                            events_tx.clone(),
                            cancel.clone(),
                        ));
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        run.handle(AgentEvent::BootFailed { id, reason }).await;
                    }
                }
            }
            drop(events_tx);

            while !run.finished {
                match events_rx.recv().await {
                    Some(event) => run.handle(event).await,
                    None => {
                        tracing::warn!("Every agent link has ended");
                        run.finish().await;
                    }
                }
            }

            cancel.cancel();
        }

        let mut summary = std::mem::take(&mut run.summary);
        summary.set_elapsed(started.elapsed());
        run.notify(|l| l.testing_end(&summary));

        tracing::info!(
            "Finished in {:.1}s: {} passed, {} failed, {} unknown",
            summary.elapsed().as_secs_f64(),
            summary.passed(),
            summary.failed().count(),
            summary.unknown().count()
        );
        Ok(summary)
    }
}

/// State of one run, owned by the run loop
struct Run {
    queue: WorkQueue,
    retry: RetryPolicy,
    stranded: StrandedPolicy,
    labels: HashMap<AgentId, String>,
    agents: BTreeMap<AgentId, AgentRecord>,
    /// Agents launched but not yet connected or failed
    booting: usize,
    summary: RunSummary,
    listeners: Vec<Box<dyn Listener>>,
    finished: bool,
}

impl Run {
    fn notify(&mut self, mut f: impl FnMut(&mut dyn Listener)) {
        for listener in &mut self.listeners {
            f(listener.as_mut());
        }
    }

    fn label(&self, id: AgentId) -> String {
        self.labels
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("agent {}", id))
    }

    async fn handle(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Connected {
                id,
                sender,
                child,
                kind,
            } => {
                self.booting = self.booting.saturating_sub(1);
                let label = self.label(id);
                tracing::info!("Agent {} ({}) connected", label, kind);
                self.agents.insert(
                    id,
                    AgentRecord {
                        label,
                        sender,
                        child,
                        kind,
                        outstanding: 0,
                        assigned: Vec::new(),
                    },
                );
            }
            AgentEvent::BootFailed { id, reason } => {
                self.booting = self.booting.saturating_sub(1);
                tracing::warn!("Agent {} failed to boot: {}", self.label(id), reason);
                self.check_end().await;
            }
            AgentEvent::Message { id, message } => self.handle_message(id, message).await,
            AgentEvent::Lost { id, reason } => {
                self.remove_agent(id, &reason);
                self.dispatch_all(None).await;
            }
        }
    }

    async fn handle_message(&mut self, id: AgentId, message: Message) {
        let Some(record) = self.agents.get_mut(&id) else {
            tracing::trace!("Dropping {} from removed agent {}", message.message_type(), id);
            return;
        };

        match message {
            Message::AgentReady { executors } => {
                tracing::info!("Agent {} ready with {} executors", record.label, executors);
                let label = record.label.clone();
                self.notify(|l| l.agent_begin(&label, executors));
            }
            Message::RequestWork => {
                record.outstanding += 1;
                self.dispatch_all(Some(id)).await;
            }
            Message::WorkResult { item, output } => {
                // A result frees the executor that sent it
                record.outstanding += 1;
                self.handle_result(id, item, output).await
            }
            Message::ExecutorLost { item, output } => {
                tracing::warn!("{}: {}", record.label, output);
                self.handle_result(id, item, output).await
            }
            Message::Heartbeat => {
                tracing::trace!("Heartbeat from {}", record.label);
            }
            other => {
                // A remote shell echoes what it is sent
                tracing::trace!("Ignoring {} from {}", other.message_type(), record.label);
            }
        }
    }

    async fn handle_result(&mut self, id: AgentId, item: WorkItem, output: String) {
        let Some(record) = self.agents.get_mut(&id) else {
            return;
        };

        let Some(position) = record.assigned.iter().position(|(a, _)| a == &item) else {
            tracing::warn!("{} reported {} which it was not assigned", record.label, item);
            self.dispatch_all(Some(id)).await;
            return;
        };
        let (_, dispatched) = record.assigned.remove(position);

        if self.retry.should_retry(&item, &output) {
            tracing::info!(
                "Transient failure in {}, retrying (attempt {})",
                item,
                self.retry.retries(&item) + 1
            );
            self.queue.retry(item);
        } else {
            self.queue.complete(&item);
            let outcome = Outcome::from_output(&output);
            self.notify(|l| l.file_end(&item, &output));
            self.summary.push(ItemResult {
                retries: self.retry.retries(&item),
                item,
                outcome,
                duration: Some(dispatched.elapsed()),
            });
            tracing::debug!("{} items remaining", self.queue.incomplete_len());
        }

        self.dispatch_all(Some(id)).await;
    }

    /// Hand out pending items to one agent while it has open requests.
    ///
    /// Returns the failure reason if the agent's link broke.
    async fn dispatch_to(&mut self, id: AgentId) -> Result<(), String> {
        loop {
            let Some(record) = self.agents.get_mut(&id) else {
                return Ok(());
            };
            if record.outstanding == 0 {
                return Ok(());
            }
            let Some(item) = self.queue.next() else {
                return Ok(());
            };

            if let Err(e) = record
                .sender
                .send(Message::AssignWork { item: item.clone() })
                .await
            {
                self.queue.requeue(item);
                return Err(e.to_string());
            }

            tracing::debug!("Assigned {} to {}", item, record.label);
            record.outstanding -= 1;
            record.assigned.push((item.clone(), Instant::now()));
            self.notify(|l| l.file_begin(&item));
        }
    }

    /// Dispatch to `first`, then every other agent, dropping agents whose
    /// links break along the way
    async fn dispatch_all(&mut self, first: Option<AgentId>) {
        loop {
            let order: Vec<AgentId> = first
                .into_iter()
                .chain(self.agents.keys().copied().filter(|id| Some(*id) != first))
                .collect();

            let mut broken = None;
            for id in order {
                if let Err(reason) = self.dispatch_to(id).await {
                    broken = Some((id, reason));
                    break;
                }
            }

            match broken {
                Some((id, reason)) => self.remove_agent(id, &reason),
                None => break,
            }
        }

        self.check_end().await;
    }

    /// Forget a lost agent and deal with the items it held
    fn remove_agent(&mut self, id: AgentId, reason: &str) {
        let Some(mut record) = self.agents.remove(&id) else {
            return;
        };
        tracing::warn!("Lost agent {}: {}", record.label, reason);

        for (item, _) in record.assigned.drain(..) {
            match self.stranded {
                StrandedPolicy::Requeue => {
                    tracing::info!("Requeueing {} from {}", item, record.label);
                    self.queue.requeue(item);
                }
                StrandedPolicy::Abandon => {
                    tracing::warn!("Abandoning {} from {}", item, record.label);
                    self.queue.complete(&item);
                    self.summary.push(ItemResult {
                        retries: self.retry.retries(&item),
                        item,
                        outcome: Outcome::Unknown,
                        duration: None,
                    });
                }
            }
        }

        if let Some(mut child) = record.child.take() {
            tokio::spawn(async move { reap(&mut child, REAP_GRACE).await });
        }
    }

    async fn check_end(&mut self) {
        if self.queue.is_done() {
            self.finish().await;
        } else if self.agents.is_empty() && self.booting == 0 {
            tracing::error!(
                "No agents left with {} items incomplete",
                self.queue.incomplete_len()
            );
            self.finish().await;
        }
    }

    /// Shut every agent down and mark leftover items unknown
    async fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        for item in self.queue.drain_incomplete() {
            self.summary.push(ItemResult {
                retries: self.retry.retries(&item),
                item,
                outcome: Outcome::Unknown,
                duration: None,
            });
        }

        let agents = std::mem::take(&mut self.agents);
        let mut children = Vec::new();
        for (_, mut record) in agents {
            tracing::debug!("Shutting down {} ({})", record.label, record.kind);
            if let Err(e) = record.sender.send(Message::Shutdown).await {
                tracing::debug!("Could not send shutdown to {}: {}", record.label, e);
            }
            let label = record.label.clone();
            self.notify(|l| l.agent_end(&label));
            let _ = record.sender.close().await;
            if let Some(child) = record.child.take() {
                children.push(child);
            }
        }

        join_all(children.iter_mut().map(|child| reap(child, REAP_GRACE))).await;
    }
}

/// Sync and launch a remote agent, then listen to it
async fn boot_remote(
    id: AgentId,
    spec: AgentSpec,
    sync: Option<SyncSpec>,
    launcher: Arc<dyn AgentLauncher>,
    boot_timeout: Duration,
    events: mpsc::Sender<AgentEvent>,
    cancel: CancellationToken,
) {
    let boot = async {
        if let Some(sync) = &sync {
            if let Err(e) = sync_agent(sync, &spec).await {
                return Err(e.to_string());
            }
        }
        launcher.launch(&spec).await.map_err(|e| e.to_string())
    };

    let result = tokio::select! {
        _ = cancel.cancelled() => return,
        result = boot => result,
    };

    match result {
        Ok(connection) => listen_agent(id, connection, boot_timeout, events, cancel).await,
        Err(reason) => {
            let _ = events.send(AgentEvent::BootFailed { id, reason }).await;
        }
    }
}

/// Forward an agent's messages to the run loop until its link ends
async fn listen_agent(
    id: AgentId,
    connection: Connection,
    boot_timeout: Duration,
    events: mpsc::Sender<AgentEvent>,
    cancel: CancellationToken,
) {
    let Connection {
        transport,
        child,
        kind,
    } = connection;
    let (sender, mut receiver) = transport.split();

    let first = tokio::select! {
        _ = cancel.cancelled() => return,
        first = tokio::time::timeout(boot_timeout, receiver.receive()) => first,
    };

    let booted = match first {
        Ok(Ok(Some(message))) => Ok(message),
        Ok(Ok(None)) => Err("closed the link while booting".to_string()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("no message within {:?}", boot_timeout)),
    };

    let first = match booted {
        Ok(message) => message,
        Err(reason) => {
            // Dropping the child kills it
            let _ = sender.close().await;
            drop(child);
            let _ = events.send(AgentEvent::BootFailed { id, reason }).await;
            return;
        }
    };

    let connected = AgentEvent::Connected {
        id,
        sender,
        child,
        kind,
    };
    if events.send(connected).await.is_err() {
        return;
    }
    if events
        .send(AgentEvent::Message { id, message: first })
        .await
        .is_err()
    {
        return;
    }

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return,
            received = receiver.receive() => received,
        };

        let event = match received {
            Ok(Some(message)) => AgentEvent::Message { id, message },
            Ok(None) => AgentEvent::Lost {
                id,
                reason: "closed the link".to_string(),
            },
            Err(e) => AgentEvent::Lost {
                id,
                reason: e.to_string(),
            },
        };

        let lost = matches!(event, AgentEvent::Lost { .. });
        if events.send(event).await.is_err() || lost {
            return;
        }
    }
}
