//! Duration report and queue ordering
//!
//! The report maps each work item to the timing of its last run. It is
//! read once when a run starts and rewritten when the run ends. Items that
//! took longest last time are dispatched first, so one slow item does not
//! start last and stretch the whole run.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use hy_protocol::WorkItem;
use serde::{Deserialize, Serialize};

/// Timing of one item's last run, in seconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub passed: bool,
}

impl TimingRecord {
    /// A record for a run between `start` and `end`
    pub fn new(start: f64, end: f64, passed: bool) -> Self {
        Self {
            start,
            end,
            duration: (end - start).max(0.0),
            passed,
        }
    }
}

/// Timings of past runs, keyed by item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurationReport {
    records: BTreeMap<WorkItem, TimingRecord>,
}

impl DurationReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a report. A missing or unreadable file gives an empty report.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No duration report at {}", path.display());
                return Self::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read duration report {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Ignoring malformed duration report {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write the report, replacing `path` atomically
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Timing of `item`, if known
    pub fn get(&self, item: &WorkItem) -> Option<&TimingRecord> {
        self.records.get(item)
    }

    /// Store the timing of `item`, replacing any earlier one
    pub fn record(&mut self, item: WorkItem, timing: TimingRecord) {
        self.records.insert(item, timing);
    }

    /// Number of items with a timing
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the report is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Order `items` for dispatch.
    ///
    /// Items without history come first in their original order, then
    /// known items by descending duration. The sort is stable.
    pub fn sort_items(&self, items: &mut [WorkItem]) {
        items.sort_by(|a, b| match (self.get(a), self.get(b)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => y
                .duration
                .partial_cmp(&x.duration)
                .unwrap_or(Ordering::Equal),
        });
    }
}
