//! Output formatting utilities for the CLI
//!
//! This module provides the end-of-run summary table, the progress bar
//! listener, and colored status messages.

mod progress;

pub use progress::ProgressBar;

use std::time::Duration;

use hy_coordinator::{ItemResult, Outcome, RunSummary};
use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

/// Format the items that did not pass as an ASCII table, followed by a
/// totals line
///
/// # Arguments
/// * `summary` - Final outcome of a run
///
/// # Returns
/// A formatted string suitable for terminal output. Only the totals line is
/// returned when every item passed.
pub fn format_summary(summary: &RunSummary) -> String {
    #[derive(Tabled)]
    struct ResultRow {
        #[tabled(rename = "ITEM")]
        item: String,
        #[tabled(rename = "RESULT")]
        result: String,
        #[tabled(rename = "RETRIES")]
        retries: u32,
        #[tabled(rename = "TIME")]
        time: String,
        #[tabled(rename = "DETAIL")]
        detail: String,
    }

    let totals = format!(
        "{} items in {}: {} passed, {} failed, {} unknown",
        summary.len(),
        format_duration(summary.elapsed()),
        summary.passed(),
        summary.failed().count(),
        summary.unknown().count()
    );

    let rows: Vec<ResultRow> = summary
        .results()
        .iter()
        .filter(|r| !r.outcome.is_passed())
        .map(|r| ResultRow {
            item: r.item.to_string(),
            result: r.outcome.label().to_string(),
            retries: r.retries,
            time: r
                .duration
                .map(format_duration)
                .unwrap_or_else(|| "-".to_string()),
            detail: detail(r),
        })
        .collect();

    if rows.is_empty() {
        return totals;
    }

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(120))
        .to_string();
    format!("{}\n{}", table, totals)
}

/// First line of the failure output
fn detail(result: &ItemResult) -> String {
    match &result.outcome {
        Outcome::Failed(output) => {
            let line = output
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("");
            truncate(line, 60)
        }
        Outcome::Unknown => "agent lost".to_string(),
        Outcome::Passed => String::new(),
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
///
/// Outputs to stderr.
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
