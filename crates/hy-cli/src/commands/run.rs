//! Run command implementation

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use hy_coordinator::{Coordinator, MinimalOutput, ProcessAgentLauncher, ReportGenerator};
use hy_core::config::RunConfig;
use hy_protocol::WorkItem;

use crate::output::{format_summary, print_error, print_success, print_warning, ProgressBar};

/// How results are shown while the run is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Item list, failure output as it arrives, completion line
    Minimal,
    /// A single redrawn progress line
    Progress,
    /// Nothing until the final summary
    Quiet,
}

/// Expand glob patterns into work items.
///
/// Matches keep the order of their patterns; a path matched by more than
/// one pattern is only queued once.
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<WorkItem>> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for pattern in patterns {
        let paths =
            glob::glob(pattern).with_context(|| format!("Invalid pattern {:?}", pattern))?;

        let mut matched = false;
        for path in paths {
            let path = path.with_context(|| format!("Failed to read a match of {:?}", pattern))?;
            if !path.is_file() {
                continue;
            }
            matched = true;
            let item = WorkItem::from(path.to_string_lossy().into_owned());
            if seen.insert(item.clone()) {
                items.push(item);
            }
        }

        if !matched {
            tracing::warn!("Pattern {:?} matched no files", pattern);
        }
    }

    Ok(items)
}

/// Run every matching item across the configured agents.
///
/// Returns whether every item passed.
pub async fn run_command(config: RunConfig, patterns: &[String], mode: OutputMode) -> Result<bool> {
    let items = expand_patterns(patterns)?;
    if items.is_empty() {
        print_warning("No files matched, nothing to run");
    }
    tracing::info!(
        "Running {} items on {} executors across {} agents",
        items.len(),
        config.total_executors(),
        config.agents.len()
    );

    let launcher = ProcessAgentLauncher::current(config.command.clone())
        .context("Failed to locate the hydra executable")?
        .with_heartbeat_interval(config.heartbeat_interval);
    let report = ReportGenerator::new(config.heuristic_path());

    let coordinator = Coordinator::new(config, Arc::new(launcher)).with_listener(report);
    let coordinator = match mode {
        OutputMode::Minimal => coordinator.with_listener(MinimalOutput::new()),
        OutputMode::Progress => coordinator.with_listener(ProgressBar::new()),
        OutputMode::Quiet => coordinator,
    };

    let summary = tokio::select! {
        summary = coordinator.run(items) => summary?,
        _ = tokio::signal::ctrl_c() => {
            print_warning("Interrupted, stopping agents");
            return Ok(false);
        }
    };

    println!();
    println!("{}", format_summary(&summary));

    if summary.success() {
        print_success(&format!("{} items passed", summary.passed()));
    } else {
        let failed = summary.failed().count();
        let unknown = summary.unknown().count();
        print_error(&format!(
            "{} failed, {} without a result, {} passed",
            failed,
            unknown,
            summary.passed()
        ));
    }

    Ok(summary.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &std::path::Path, name: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, "").unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_expand_patterns_in_order_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a_test.rb");
        let b = touch(dir.path(), "b_test.rb");
        touch(dir.path(), "helper.rb");

        let root = dir.path().display();
        let patterns = vec![b.clone(), format!("{}/*_test.rb", root)];
        let items = expand_patterns(&patterns).unwrap();

        assert_eq!(items, vec![WorkItem::from(b), WorkItem::from(a)]);
    }

    #[test]
    fn test_directories_are_not_items() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let file = touch(dir.path(), "x.rb");

        let items = expand_patterns(&[format!("{}/*", dir.path().display())]).unwrap();
        assert_eq!(items, vec![WorkItem::from(file)]);
    }

    #[test]
    fn test_unmatched_and_invalid_patterns() {
        assert!(expand_patterns(&["/nonexistent/**/*.rb".to_string()])
            .unwrap()
            .is_empty());
        assert!(expand_patterns(&["[".to_string()]).is_err());
    }
}
