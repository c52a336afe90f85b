//! Single-line progress bar listener

use std::io::Write;

use crossterm::cursor::MoveToColumn;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use hy_coordinator::{Listener, Outcome, RunSummary};
use hy_protocol::WorkItem;

const BAR_WIDTH: usize = 40;

/// Redraws one line with the share of finished items. Failure output is
/// printed above the bar as it arrives.
pub struct ProgressBar {
    out: Box<dyn Write + Send>,
    total: usize,
    done: usize,
    failed: usize,
}

impl ProgressBar {
    /// Draw on stdout
    pub fn new() -> Self {
        Self::to_writer(std::io::stdout())
    }

    /// Draw on `out`
    pub fn to_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Box::new(out),
            total: 0,
            done: 0,
            failed: 0,
        }
    }

    fn bar(&self) -> String {
        let filled = if self.total == 0 {
            BAR_WIDTH
        } else {
            self.done * BAR_WIDTH / self.total
        };
        format!(
            "[{}{}] {}/{}",
            "=".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
            self.done,
            self.total
        )
    }

    fn redraw(&mut self) {
        let color = if self.failed == 0 {
            Color::Green
        } else {
            Color::Red
        };
        let bar = self.bar();
        let _ = crossterm::queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            SetForegroundColor(color),
            Print(bar),
            ResetColor
        );
        let _ = self.out.flush();
    }
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener for ProgressBar {
    fn testing_begin(&mut self, items: &[WorkItem]) {
        self.total = items.len();
        self.redraw();
    }

    fn file_end(&mut self, item: &WorkItem, output: &str) {
        self.done += 1;
        if let Outcome::Failed(detail) = Outcome::from_output(output) {
            self.failed += 1;
            let _ = crossterm::queue!(
                self.out,
                MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                SetForegroundColor(Color::Red),
                Print(format!("{}\n", item)),
                ResetColor,
                Print(format!("{}\n", detail.trim_end()))
            );
        }
        self.redraw();
    }

    fn testing_end(&mut self, _summary: &RunSummary) {
        let _ = writeln!(self.out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_progress_counts_and_failures() {
        let buffer = Buffer::default();
        let mut bar = ProgressBar::to_writer(buffer.clone());

        let items = vec![WorkItem::new("a.rb"), WorkItem::new("b.rb")];
        bar.testing_begin(&items);
        assert_eq!(bar.bar(), format!("[{}] 0/2", " ".repeat(BAR_WIDTH)));

        bar.file_end(&items[0], ".");
        assert_eq!(bar.done, 1);
        assert_eq!(bar.failed, 0);

        bar.file_end(&items[1], "1) Failure\n");
        bar.testing_end(&RunSummary::new());
        assert_eq!(bar.bar(), format!("[{}] 2/2", "=".repeat(BAR_WIDTH)));
        assert_eq!(bar.failed, 1);

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("b.rb\n"));
        assert!(text.contains("1) Failure\n"));
        assert!(text.contains("2/2"));
        assert!(!text.contains("a.rb\n"));
    }

    #[test]
    fn test_empty_run_is_full() {
        let bar = ProgressBar::to_writer(Buffer::default());
        assert_eq!(bar.bar(), format!("[{}] 0/0", "=".repeat(BAR_WIDTH)));
    }
}
