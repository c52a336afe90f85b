//! The work queue of one run

use std::collections::{HashMap, VecDeque};

use hy_protocol::WorkItem;

/// Items waiting to be dispatched, and items still lacking a final result.
///
/// Duplicate items are tracked as a multiset; each copy needs its own
/// final result.
#[derive(Debug, Default)]
pub struct WorkQueue {
    pending: VecDeque<WorkItem>,
    incomplete: HashMap<WorkItem, usize>,
    incomplete_len: usize,
}

impl WorkQueue {
    /// Create a queue holding `items` in dispatch order
    pub fn new(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let mut queue = Self::default();
        for item in items {
            *queue.incomplete.entry(item.clone()).or_default() += 1;
            queue.incomplete_len += 1;
            queue.pending.push_back(item);
        }
        queue
    }

    /// Take the next item to dispatch
    pub fn next(&mut self) -> Option<WorkItem> {
        self.pending.pop_front()
    }

    /// Put a transiently failed item at the back of the queue
    pub fn retry(&mut self, item: WorkItem) {
        self.pending.push_back(item);
    }

    /// Put an item that was never run back at the head of the queue
    pub fn requeue(&mut self, item: WorkItem) {
        self.pending.push_front(item);
    }

    /// Record one final result for `item`.
    ///
    /// Returns false if no copy of `item` was incomplete.
    pub fn complete(&mut self, item: &WorkItem) -> bool {
        match self.incomplete.get_mut(item) {
            Some(count) => {
                *count -= 1;
                if *count == 0 {
                    self.incomplete.remove(item);
                }
                self.incomplete_len -= 1;
                true
            }
            None => false,
        }
    }

    /// Whether every item has a final result
    pub fn is_done(&self) -> bool {
        self.incomplete_len == 0
    }

    /// Number of items still lacking a final result
    pub fn incomplete_len(&self) -> usize {
        self.incomplete_len
    }

    /// Remove and return every item still lacking a final result
    pub fn drain_incomplete(&mut self) -> Vec<WorkItem> {
        self.pending.clear();
        self.incomplete_len = 0;

        let mut items: Vec<WorkItem> = self
            .incomplete
            .drain()
            .flat_map(|(item, count)| std::iter::repeat(item).take(count))
            .collect();
        items.sort();
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> Vec<WorkItem> {
        names.iter().map(|n| WorkItem::new(*n)).collect()
    }

    #[test]
    fn test_dispatch_order_and_completion() {
        let mut queue = WorkQueue::new(items(&["a", "b"]));
        assert_eq!(queue.next(), Some(WorkItem::new("a")));
        assert_eq!(queue.incomplete_len(), 2);

        assert!(queue.complete(&WorkItem::new("a")));
        assert!(!queue.is_done());
        assert!(!queue.complete(&WorkItem::new("a")));

        assert_eq!(queue.next(), Some(WorkItem::new("b")));
        assert!(queue.complete(&WorkItem::new("b")));
        assert!(queue.is_done());
        assert_eq!(queue.next(), None);
    }

    #[test]
    fn test_retry_goes_to_back_and_requeue_to_front() {
        let mut queue = WorkQueue::new(items(&["a", "b", "c"]));
        let a = queue.next().unwrap();
        let b = queue.next().unwrap();

        queue.retry(a);
        queue.requeue(b);

        assert_eq!(queue.next(), Some(WorkItem::new("b")));
        assert_eq!(queue.next(), Some(WorkItem::new("c")));
        assert_eq!(queue.next(), Some(WorkItem::new("a")));
        assert_eq!(queue.incomplete_len(), 3);
    }

    #[test]
    fn test_duplicates_need_separate_results() {
        let mut queue = WorkQueue::new(items(&["a", "a"]));
        assert!(queue.complete(&WorkItem::new("a")));
        assert!(!queue.is_done());
        assert_eq!(queue.incomplete_len(), 1);
        assert!(queue.complete(&WorkItem::new("a")));
        assert!(queue.is_done());
    }

    #[test]
    fn test_drain_incomplete() {
        let mut queue = WorkQueue::new(items(&["b", "a", "b", "c"]));
        queue.next();
        queue.complete(&WorkItem::new("c"));

        assert_eq!(queue.drain_incomplete(), items(&["a", "b", "b"]));
        assert!(queue.is_done());
        assert_eq!(queue.next(), None);
    }
}
