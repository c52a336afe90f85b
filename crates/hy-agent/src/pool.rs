//! Executor records held by an agent
//!
//! Each executor is either idle or busy. Every busy-to-idle transition
//! pushes the executor's index onto an idle channel, so [`ExecutorPool::acquire`]
//! waits for a notification instead of polling the table.

use dashmap::DashMap;
use hy_core::MessageSender;
use hy_protocol::WorkItem;
use tokio::sync::{mpsc, Mutex};

/// One executor as seen by its agent
#[derive(Debug)]
struct ExecutorSlot {
    sender: MessageSender,
    idle: bool,
    current: Option<WorkItem>,
}

/// The executors of one agent, indexed by boot order
pub struct ExecutorPool {
    executors: DashMap<usize, ExecutorSlot>,
    idle_tx: mpsc::UnboundedSender<usize>,
    idle_rx: Mutex<mpsc::UnboundedReceiver<usize>>,
}

impl ExecutorPool {
    /// Create an empty pool
    pub fn new() -> Self {
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        Self {
            executors: DashMap::new(),
            idle_tx,
            idle_rx: Mutex::new(idle_rx),
        }
    }

    /// Record a freshly booted executor. It starts busy until it asks for work.
    pub fn insert(&self, index: usize, sender: MessageSender) {
        self.executors.insert(
            index,
            ExecutorSlot {
                sender,
                idle: false,
                current: None,
            },
        );
    }

    /// Mark an executor idle and clear its current item
    pub fn mark_idle(&self, index: usize) {
        if let Some(mut slot) = self.executors.get_mut(&index) {
            slot.current = None;
            if !slot.idle {
                slot.idle = true;
                let _ = self.idle_tx.send(index);
            }
        }
    }

    /// Wait for an idle executor and mark it busy with `item`.
    ///
    /// Returns `None` once every executor has been removed.
    pub async fn acquire(&self, item: &WorkItem) -> Option<(usize, MessageSender)> {
        let mut idle_rx = self.idle_rx.lock().await;
        loop {
            if self.executors.is_empty() {
                return None;
            }

            let index = idle_rx.recv().await?;

            // Removed executors also wake the channel; skip them
            if let Some(mut slot) = self.executors.get_mut(&index) {
                if slot.idle {
                    slot.idle = false;
                    slot.current = Some(item.clone());
                    return Some((index, slot.sender.clone()));
                }
            }
        }
    }

    /// Drop an executor, returning the item it was running, if any
    pub fn remove(&self, index: usize) -> Option<WorkItem> {
        let removed = self.executors.remove(&index);
        let _ = self.idle_tx.send(index);
        removed.and_then(|(_, slot)| slot.current)
    }

    /// Senders of every remaining executor
    pub fn senders(&self) -> Vec<(usize, MessageSender)> {
        self.executors
            .iter()
            .map(|entry| (*entry.key(), entry.value().sender.clone()))
            .collect()
    }

    /// Number of executors
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Check if pool is empty
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl Default for ExecutorPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hy_core::transport::pair;
    use std::sync::Arc;
    use std::time::Duration;

    fn sender() -> MessageSender {
        let (left, _right) = pair();
        left.sender()
    }

    #[tokio::test]
    async fn test_acquire_waits_for_idle() {
        let pool = Arc::new(ExecutorPool::new());
        pool.insert(0, sender());

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(&WorkItem::new("a")).await.map(|(i, _)| i) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        pool.mark_idle(0);
        assert_eq!(waiter.await.unwrap(), Some(0));
        assert_eq!(pool.remove(0), Some(WorkItem::new("a")));
    }

    #[tokio::test]
    async fn test_repeated_idle_gives_one_token() {
        let pool = ExecutorPool::new();
        pool.insert(0, sender());
        pool.insert(1, sender());

        pool.mark_idle(0);
        pool.mark_idle(0);
        pool.mark_idle(1);

        let first = pool.acquire(&WorkItem::new("a")).await.unwrap().0;
        let second = pool.acquire(&WorkItem::new("b")).await.unwrap().0;
        assert_eq!((first, second), (0, 1));
    }

    #[tokio::test]
    async fn test_remove_returns_current_item() {
        let pool = ExecutorPool::new();
        pool.insert(0, sender());
        pool.mark_idle(0);

        let (index, _) = pool.acquire(&WorkItem::new("slow.rb")).await.unwrap();
        assert_eq!(pool.remove(index), Some(WorkItem::new("slow.rb")));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_acquire_ends_when_all_removed() {
        let pool = Arc::new(ExecutorPool::new());
        pool.insert(0, sender());

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(&WorkItem::new("a")).await.is_none() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.remove(0), None);
        assert!(waiter.await.unwrap());
    }
}
