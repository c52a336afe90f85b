//! Retry of transient failures
//!
//! Some failures say nothing about the item itself: a database deadlock
//! between two executors sharing a database is the classic case. Results
//! matching one of these signatures are put back on the queue.

use std::collections::HashMap;

use hy_core::ConfigError;
use hy_protocol::WorkItem;
use regex::RegexSet;

/// Built-in transient failure signatures
pub const TRANSIENT_SIGNATURES: &[&str] = &[
    r"ActiveRecord::StatementInvalid(.*)[Dd]eadlock",
    r"PGError: ERROR(.*)[Dd]eadlock",
    r"Mysql::Error: SAVEPOINT(.*)does not exist: ROLLBACK",
    r"Mysql::Error: Deadlock found",
    r"Deadlock found",
];

/// Decides whether a result is retried
#[derive(Debug)]
pub struct RetryPolicy {
    signatures: RegexSet,
    max_retries: Option<u32>,
    attempts: HashMap<WorkItem, u32>,
}

impl RetryPolicy {
    /// Built-in signatures plus `extra` patterns, retried at most
    /// `max_retries` times per item (unbounded when `None`)
    pub fn new(extra: &[String], max_retries: Option<u32>) -> Result<Self, ConfigError> {
        let patterns = TRANSIENT_SIGNATURES
            .iter()
            .map(|s| s.to_string())
            .chain(extra.iter().cloned());

        let signatures = RegexSet::new(patterns)
            .map_err(|e| ConfigError::Invalid(format!("bad retry pattern: {}", e)))?;

        Ok(Self {
            signatures,
            max_retries,
            attempts: HashMap::new(),
        })
    }

    /// Whether `output` looks like a transient failure
    pub fn is_transient(&self, output: &str) -> bool {
        self.signatures.is_match(output)
    }

    /// Whether to run `item` again, counting the attempt if so
    pub fn should_retry(&mut self, item: &WorkItem, output: &str) -> bool {
        if !self.is_transient(output) {
            return false;
        }

        let attempts = self.attempts.entry(item.clone()).or_default();
        if let Some(max) = self.max_retries {
            if *attempts >= max {
                tracing::warn!("{} hit a transient failure {} times, giving up", item, *attempts + 1);
                return false;
            }
        }

        *attempts += 1;
        true
    }

    /// Number of retries so far for `item`
    pub fn retries(&self, item: &WorkItem) -> u32 {
        self.attempts.get(item).copied().unwrap_or(0)
    }
}
