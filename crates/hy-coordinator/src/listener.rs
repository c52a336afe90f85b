//! Run lifecycle listeners
//!
//! Listeners are called from the coordinator loop, in order of
//! registration. Every method defaults to doing nothing.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use hy_core::time::current_time_secs_f64;
use hy_protocol::WorkItem;

use crate::heuristic::{DurationReport, TimingRecord};
use crate::summary::{Outcome, RunSummary};

/// Observer of run lifecycle events
pub trait Listener: Send {
    /// The queue is known, before any agent boots
    fn testing_begin(&mut self, _items: &[WorkItem]) {}

    /// Every agent has been shut down
    fn testing_end(&mut self, _summary: &RunSummary) {}

    /// An agent finished booting its executors
    fn agent_begin(&mut self, _agent: &str, _executors: usize) {}

    /// An agent is about to be shut down
    fn agent_end(&mut self, _agent: &str) {}

    /// An item was handed to an agent
    fn file_begin(&mut self, _item: &WorkItem) {}

    /// An item has its final result
    fn file_end(&mut self, _item: &WorkItem, _output: &str) {}
}

/// Prints the item list, each failure's output, and a completion line
pub struct MinimalOutput {
    out: Box<dyn Write + Send>,
}

impl MinimalOutput {
    /// Write to stdout
    pub fn new() -> Self {
        Self::to_writer(std::io::stdout())
    }

    /// Write to `out`
    pub fn to_writer(out: impl Write + Send + 'static) -> Self {
        Self { out: Box::new(out) }
    }
}

impl Default for MinimalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener for MinimalOutput {
    fn testing_begin(&mut self, items: &[WorkItem]) {
        let names: Vec<&str> = items.iter().map(|i| i.as_str()).collect();
        let _ = writeln!(self.out, "Hydra Testing:\n{:?}", names);
    }

    fn testing_end(&mut self, _summary: &RunSummary) {
        let _ = writeln!(self.out, "\nHydra Completed");
    }

    fn file_end(&mut self, _item: &WorkItem, output: &str) {
        let _ = write!(self.out, "{}", output);
        let _ = self.out.flush();
    }
}

/// Records the timing of each item and saves the duration report when
/// the run ends
pub struct ReportGenerator {
    path: PathBuf,
    started: HashMap<WorkItem, f64>,
    report: DurationReport,
}

impl ReportGenerator {
    /// Merge this run's timings over the report at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let report = DurationReport::load(&path);
        Self {
            path,
            started: HashMap::new(),
            report,
        }
    }

    /// The report as recorded so far
    pub fn report(&self) -> &DurationReport {
        &self.report
    }
}

impl Listener for ReportGenerator {
    fn file_begin(&mut self, item: &WorkItem) {
        self.started.insert(item.clone(), current_time_secs_f64());
    }

    fn file_end(&mut self, item: &WorkItem, output: &str) {
        let end = current_time_secs_f64();
        let start = self.started.remove(item).unwrap_or(end);
        let passed = Outcome::from_output(output).is_passed();
        self.report
            .record(item.clone(), TimingRecord::new(start, end, passed));
    }

    fn testing_end(&mut self, _summary: &RunSummary) {
        match self.report.save(&self.path) {
            Ok(()) => tracing::debug!(
                "Saved {} timings to {}",
                self.report.len(),
                self.path.display()
            ),
            Err(e) => tracing::warn!(
                "Failed to save duration report {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
