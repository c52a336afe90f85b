//! Agent relay behavior against a scripted coordinator

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hy_agent::{Agent, AgentOptions, InProcessExecutorLauncher, WorkRunner};
use hy_core::transport::pair;
use hy_core::{Connection, ExecutorLauncher, HydraError, Transport};
use hy_protocol::{Message, WorkItem};

/// Records how many items run at once
#[derive(Default)]
struct CountingRunner {
    running: AtomicUsize,
    peak: AtomicUsize,
    finished: AtomicUsize,
}

#[async_trait]
impl WorkRunner for CountingRunner {
    async fn run(&self, item: &WorkItem) -> String {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        format!("done {}", item)
    }
}

fn start_agent(runner: Arc<CountingRunner>, executors: usize) -> (Transport, tokio::task::JoinHandle<()>) {
    let (coordinator, agent_side) = pair();
    let launcher = Arc::new(InProcessExecutorLauncher::new(runner));
    let handle = tokio::spawn(async move {
        Agent::new(agent_side, launcher, AgentOptions::with_executors(executors))
            .run()
            .await
            .unwrap();
    });
    (coordinator, handle)
}

/// Read messages until `count` of the wanted kind arrive, ignoring others
async fn collect_results(coordinator: &mut Transport, count: usize) -> Vec<(WorkItem, String)> {
    let mut results = Vec::new();
    while results.len() < count {
        match coordinator.receive().await.unwrap() {
            Some(Message::WorkResult { item, output }) => results.push((item, output)),
            Some(_) => {}
            None => panic!("agent closed the link early"),
        }
    }
    results
}

#[tokio::test]
async fn test_boot_announces_ready_and_requests() {
    let runner = Arc::new(CountingRunner::default());
    let (mut coordinator, handle) = start_agent(runner, 3);

    let mut ready = None;
    let mut requests = 0;
    while ready.is_none() || requests < 3 {
        match coordinator.receive().await.unwrap() {
            Some(Message::AgentReady { executors }) => ready = Some(executors),
            Some(Message::RequestWork) => requests += 1,
            Some(other) => panic!("unexpected {:?}", other),
            None => panic!("agent closed the link"),
        }
    }
    assert_eq!(ready, Some(3));

    coordinator.send(Message::Shutdown).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_ready_is_first_message() {
    let runner = Arc::new(CountingRunner::default());
    let (mut coordinator, handle) = start_agent(runner, 4);

    match coordinator.receive().await.unwrap() {
        Some(Message::AgentReady { executors }) => assert_eq!(executors, 4),
        other => panic!("expected AgentReady first, got {:?}", other),
    }

    coordinator.send(Message::Shutdown).await.unwrap();
    handle.await.unwrap();
}

/// Executors that ask for work and drop their link once given an item
struct CrashingLauncher;

#[async_trait]
impl ExecutorLauncher for CrashingLauncher {
    async fn launch(&self, _index: usize) -> Result<Connection, HydraError> {
        let (ours, theirs) = pair();
        let (tx, mut rx) = theirs.split();
        tokio::spawn(async move {
            tx.send(Message::RequestWork).await.unwrap();
            while let Ok(Some(message)) = rx.receive().await {
                if matches!(message, Message::AssignWork { .. }) {
                    break;
                }
            }
            drop((tx, rx));
        });
        Ok(Connection::in_process(ours))
    }
}

#[tokio::test]
async fn test_lost_executor_reported_without_result() {
    let (mut coordinator, agent_side) = pair();
    let handle = tokio::spawn(
        Agent::new(agent_side, Arc::new(CrashingLauncher), AgentOptions::with_executors(1)).run(),
    );

    coordinator
        .send(Message::AssignWork {
            item: WorkItem::new("doomed_test.rb"),
        })
        .await
        .unwrap();

    let mut lost = None;
    while let Some(message) = coordinator.receive().await.unwrap() {
        match message {
            Message::ExecutorLost { item, output } => lost = Some((item, output)),
            Message::WorkResult { .. } => panic!("a lost executor must not report a result"),
            _ => {}
        }
    }

    let (item, output) = lost.expect("no ExecutorLost reported");
    assert_eq!(item, WorkItem::new("doomed_test.rb"));
    assert!(output.contains("exited while running doomed_test.rb"));

    // The only executor is gone, so the agent stops on its own
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("agent did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_at_most_one_item_per_executor() {
    let runner = Arc::new(CountingRunner::default());
    let (mut coordinator, handle) = start_agent(Arc::clone(&runner), 1);

    for name in ["a.rb", "b.rb", "c.rb"] {
        coordinator
            .send(Message::AssignWork {
                item: WorkItem::new(name),
            })
            .await
            .unwrap();
    }

    let results = collect_results(&mut coordinator, 3).await;
    let items: HashSet<_> = results.iter().map(|(item, _)| item.as_str().to_string()).collect();
    assert_eq!(items.len(), 3);
    assert_eq!(runner.peak.load(Ordering::SeqCst), 1);

    coordinator.send(Message::Shutdown).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_results_are_relayed_unchanged() {
    let runner = Arc::new(CountingRunner::default());
    let (mut coordinator, handle) = start_agent(runner, 2);

    coordinator
        .send(Message::AssignWork {
            item: WorkItem::new("test/x_test.rb"),
        })
        .await
        .unwrap();

    let results = collect_results(&mut coordinator, 1).await;
    assert_eq!(
        results,
        vec![(WorkItem::new("test/x_test.rb"), "done test/x_test.rb".to_string())]
    );

    coordinator.send(Message::Shutdown).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_reaches_executors_and_closes_link() {
    let runner = Arc::new(CountingRunner::default());
    let (mut coordinator, handle) = start_agent(Arc::clone(&runner), 2);

    coordinator
        .send(Message::AssignWork {
            item: WorkItem::new("slow.rb"),
        })
        .await
        .unwrap();
    collect_results(&mut coordinator, 1).await;

    coordinator.send(Message::Shutdown).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("agent did not stop")
        .unwrap();

    // The agent closes its side once it has stopped
    loop {
        match coordinator.receive().await.unwrap() {
            Some(_) => continue,
            None => break,
        }
    }
    assert_eq!(runner.running.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_coordinator_eof_stops_agent() {
    let runner = Arc::new(CountingRunner::default());
    let (coordinator, handle) = start_agent(runner, 2);

    drop(coordinator);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("agent did not stop")
        .unwrap();
}
