//! Outcome of a run

use std::time::Duration;

use hy_protocol::WorkItem;

/// Final outcome of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The runner reported success
    Passed,
    /// The runner reported failure detail
    Failed(String),
    /// No result: the item was stranded or never ran
    Unknown,
}

impl Outcome {
    /// Classify runner output. `"."` or blank output is a pass.
    pub fn from_output(output: &str) -> Self {
        let trimmed = output.trim();
        if trimmed.is_empty() || trimmed == "." {
            Outcome::Passed
        } else {
            Outcome::Failed(output.to_string())
        }
    }

    /// Whether this is a pass
    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    /// Short label for tables
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Failed(_) => "failed",
            Outcome::Unknown => "unknown",
        }
    }
}

/// Final result of one item
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResult {
    pub item: WorkItem,
    pub outcome: Outcome,
    /// Time from the last dispatch to the final result
    pub duration: Option<Duration>,
    /// Transient failures retried before the final result
    pub retries: u32,
}

/// Every item's final outcome
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    results: Vec<ItemResult>,
    elapsed: Duration,
}

impl RunSummary {
    /// Create an empty summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one item's final result
    pub fn push(&mut self, result: ItemResult) {
        self.results.push(result);
    }

    /// Set the wall-clock time of the run
    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    /// Wall-clock time of the run
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Results in completion order
    pub fn results(&self) -> &[ItemResult] {
        &self.results
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if there are no results
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of passed items
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_passed()).count()
    }

    /// Failed items
    pub fn failed(&self) -> impl Iterator<Item = &ItemResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
    }

    /// Items without a result
    pub fn unknown(&self) -> impl Iterator<Item = &ItemResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Unknown))
    }

    /// True only if every item passed
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_passed())
    }
}
